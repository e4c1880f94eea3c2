//! In-memory embedding store implementation
//!
//! Suitable for tests and small single-instance deployments. There is no
//! native vector index, so similarity queries always take the in-process
//! scan path.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::DomainError;
use crate::domain::context::{ContextFilter, EmbeddingStore, MessageEmbedding, ScoredMessage};

#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    records: RwLock<Vec<MessageEmbedding>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(record: &MessageEmbedding, filter: &ContextFilter) -> bool {
        if record.user_id != filter.user_id {
            return false;
        }

        if let Some(ref conversation_id) = filter.conversation_id {
            if &record.conversation_id != conversation_id {
                return false;
            }
        }

        if filter
            .exclude_message_ids
            .iter()
            .any(|id| id == &record.message_id)
        {
            return false;
        }

        if let Some(ref wanted) = filter.metadata {
            if !metadata_contains(&record.metadata, wanted) {
                return false;
            }
        }

        true
    }
}

/// True when every key/value pair of `wanted` appears in `metadata`.
fn metadata_contains(metadata: &serde_json::Value, wanted: &serde_json::Value) -> bool {
    match wanted.as_object() {
        Some(pairs) => pairs
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value)),
        None => metadata == wanted,
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryMessageStore {
    async fn insert(&self, record: MessageEmbedding) -> Result<(), DomainError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        // One record per message: a repeated insert replaces the old one.
        records.retain(|r| r.message_id != record.message_id);
        records.push(record);

        Ok(())
    }

    fn supports_native_search(&self) -> bool {
        false
    }

    async fn search(
        &self,
        _query: &[f32],
        _filter: &ContextFilter,
        _limit: usize,
    ) -> Result<Vec<ScoredMessage>, DomainError> {
        Err(DomainError::storage(
            "Native vector search not supported by the in-memory store",
        ))
    }

    async fn fetch_candidates(
        &self,
        filter: &ContextFilter,
        cap: usize,
    ) -> Result<Vec<MessageEmbedding>, DomainError> {
        let records = self
            .records
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        let mut matching: Vec<MessageEmbedding> = records
            .iter()
            .filter(|r| Self::matches(r, filter))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(cap);

        Ok(matching)
    }

    async fn find_recent(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageEmbedding>, DomainError> {
        let mut filter = ContextFilter::for_user(user_id);

        if let Some(id) = conversation_id {
            filter = filter.with_conversation(id);
        }

        self.fetch_candidates(&filter, limit).await
    }

    async fn delete_by_conversation(&self, conversation_id: &str) -> Result<usize, DomainError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        let before = records.len();
        records.retain(|r| r.conversation_id != conversation_id);

        Ok(before - records.len())
    }

    async fn delete_by_message(&self, message_id: &str) -> Result<bool, DomainError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        let before = records.len();
        records.retain(|r| r.message_id != message_id);

        Ok(records.len() < before)
    }
}
