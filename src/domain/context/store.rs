//! Embedding store trait

use std::fmt::Debug;

use async_trait::async_trait;

use super::{ContextFilter, MessageEmbedding, ScoredMessage};
use crate::domain::DomainError;

/// Persistent store for per-message embeddings.
///
/// The store is the system of record and provides its own consistency
/// guarantees. Nearest-neighbour search is optional: stores without a
/// native vector index report `supports_native_search() == false` and
/// callers fall back to an in-process similarity scan over
/// `fetch_candidates`.
#[async_trait]
pub trait EmbeddingStore: Send + Sync + Debug {
    /// Insert a record. At most one record exists per message id; a
    /// repeated insert for the same message replaces the previous record.
    async fn insert(&self, record: MessageEmbedding) -> Result<(), DomainError>;

    /// Whether `search` is backed by a database-native vector index
    fn supports_native_search(&self) -> bool;

    /// Native nearest-neighbour search, best matches first. Errors (or
    /// `supports_native_search() == false`) route callers to the
    /// brute-force path.
    async fn search(
        &self,
        query: &[f32],
        filter: &ContextFilter,
        limit: usize,
    ) -> Result<Vec<ScoredMessage>, DomainError>;

    /// Bounded, filter-matching candidate set for the in-process scan,
    /// newest first.
    async fn fetch_candidates(
        &self,
        filter: &ContextFilter,
        cap: usize,
    ) -> Result<Vec<MessageEmbedding>, DomainError>;

    /// Most recent messages for a user (optionally one conversation),
    /// newest first.
    async fn find_recent(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageEmbedding>, DomainError>;

    /// Cascade delete for a conversation; returns the number removed.
    async fn delete_by_conversation(&self, conversation_id: &str) -> Result<usize, DomainError>;

    /// Cascade delete for a single message; returns whether one existed.
    async fn delete_by_message(&self, message_id: &str) -> Result<bool, DomainError>;
}
