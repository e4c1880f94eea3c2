//! Message embedding records and search types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of the message the embedding was generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// System messages carry no conversational content worth indexing.
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown message role: {}", other)),
        }
    }
}

/// A conversational message to index, before its embedding exists.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub user_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub role: MessageRole,
    pub content: String,
    pub metadata: serde_json::Value,
}

impl ContextEntry {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            role,
            content: content.into(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One stored embedding per non-system conversational message.
///
/// Write-once / read-many; records are only ever deleted in cascade with
/// their message or conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEmbedding {
    pub id: Uuid,
    pub user_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub role: MessageRole,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl MessageEmbedding {
    /// Builds a record from an entry and its freshly generated embedding.
    pub fn from_entry(entry: ContextEntry, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            conversation_id: entry.conversation_id,
            message_id: entry.message_id,
            role: entry.role,
            content: entry.content,
            embedding,
            metadata: entry.metadata,
            created_at: Utc::now(),
        }
    }
}

/// Filter predicates applied to embedding store queries.
#[derive(Debug, Clone, Default)]
pub struct ContextFilter {
    /// Owning user; always required
    pub user_id: String,
    /// Restrict to a single conversation
    pub conversation_id: Option<String>,
    /// JSON object whose key/value pairs must all be present in the
    /// record metadata
    pub metadata: Option<serde_json::Value>,
    /// Message ids excluded from the result set
    pub exclude_message_ids: Vec<String>,
}

impl ContextFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn excluding(mut self, message_ids: Vec<String>) -> Self {
        self.exclude_message_ids = message_ids;
        self
    }
}

/// A stored message paired with its similarity to a query.
///
/// Both the native search and the brute-force scan produce this shape.
#[derive(Debug, Clone)]
pub struct ScoredMessage {
    pub message: MessageEmbedding,
    pub similarity: f32,
}

impl ScoredMessage {
    pub fn new(message: MessageEmbedding, similarity: f32) -> Self {
        Self {
            message,
            similarity,
        }
    }
}
