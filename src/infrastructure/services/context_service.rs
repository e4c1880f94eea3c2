//! Semantic context storage and retrieval

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use super::EmbeddingGenerator;
use crate::domain::context::{
    ContextEntry, ContextFilter, EmbeddingStore, MessageEmbedding, ScoredMessage,
};
use crate::domain::{DomainError, cosine_similarity};

/// Tunables for semantic retrieval.
///
/// The oversampling factors and default threshold are empirical; correct
/// values depend on embedding quality and corpus size, so they are
/// configuration rather than constants.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Minimum similarity when a query specifies none
    pub default_threshold: f32,
    /// Native search fetches limit x this before threshold filtering
    pub native_oversample: usize,
    /// The in-process scan considers limit x this candidates
    pub fallback_oversample: usize,
    /// Content prefix length used to de-duplicate merged context
    pub dedup_prefix_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.7,
            native_oversample: 10,
            fallback_oversample: 3,
            dedup_prefix_chars: 80,
        }
    }
}

/// Parameters for a similarity search
#[derive(Debug, Clone)]
pub struct SimilarContextParams {
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub limit: usize,
    /// Overrides the configured default threshold
    pub threshold: Option<f32>,
    pub exclude_message_ids: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

impl SimilarContextParams {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: None,
            limit: 5,
            threshold: None,
            exclude_message_ids: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn excluding(mut self, message_ids: Vec<String>) -> Self {
        self.exclude_message_ids = message_ids;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn filter(&self) -> ContextFilter {
        let mut filter = ContextFilter::for_user(self.user_id.clone())
            .excluding(self.exclude_message_ids.clone());

        if let Some(ref conversation_id) = self.conversation_id {
            filter = filter.with_conversation(conversation_id.clone());
        }

        if let Some(ref metadata) = self.metadata {
            filter = filter.with_metadata(metadata.clone());
        }

        filter
    }
}

/// Parameters for the merged recent + semantic context window
#[derive(Debug, Clone)]
pub struct RelevantContextParams {
    pub user_id: String,
    pub conversation_id: Option<String>,
    /// Most recent messages kept for continuity
    pub recent_limit: usize,
    /// Top semantic matches kept for relevance
    pub semantic_limit: usize,
    pub threshold: Option<f32>,
}

impl RelevantContextParams {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: None,
            recent_limit: 10,
            semantic_limit: 5,
            threshold: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    pub fn with_semantic_limit(mut self, limit: usize) -> Self {
        self.semantic_limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Result of a best-effort embedding store operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored(Uuid),
    SkippedSystemRole,
    Failed,
}

/// Stores an embedding per non-system message and retrieves the most
/// semantically relevant prior messages for a query.
///
/// The write path never fails the conversational turn that triggered it;
/// the read path degrades to an in-process similarity scan when the
/// store's native vector search is unavailable.
#[derive(Debug)]
pub struct ContextService {
    store: Arc<dyn EmbeddingStore>,
    embeddings: Arc<EmbeddingGenerator>,
    config: RetrievalConfig,
}

impl ContextService {
    pub fn new(store: Arc<dyn EmbeddingStore>, embeddings: Arc<EmbeddingGenerator>) -> Self {
        Self::with_config(store, embeddings, RetrievalConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn EmbeddingStore>,
        embeddings: Arc<EmbeddingGenerator>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            config,
        }
    }

    /// Embeds and persists one message. Best-effort: every failure is
    /// absorbed and reported as [`StoreOutcome::Failed`].
    pub async fn store_message_embedding(&self, entry: ContextEntry) -> StoreOutcome {
        match self.embed_and_insert(entry).await {
            Ok(Some(record)) => StoreOutcome::Stored(record.id),
            Ok(None) => StoreOutcome::SkippedSystemRole,
            Err(error) => {
                warn!(
                    error_kind = error.kind(),
                    error = %error,
                    "Failed to store message embedding"
                );
                StoreOutcome::Failed
            }
        }
    }

    /// Stores many embeddings concurrently; a failing member never
    /// cancels its siblings. Returns the records actually stored.
    pub async fn store_message_embeddings_batch(
        &self,
        entries: Vec<ContextEntry>,
    ) -> Vec<MessageEmbedding> {
        let writes = entries.into_iter().map(|entry| self.embed_and_insert(entry));

        join_all(writes)
            .await
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(stored) => stored,
                Err(error) => {
                    warn!(error = %error, "Batch member failed to store");
                    None
                }
            })
            .collect()
    }

    /// The K most relevant prior messages for a query, scoped to a user
    /// and optionally one conversation, ordered most-similar first.
    pub async fn find_similar_context(
        &self,
        query: &str,
        params: &SimilarContextParams,
    ) -> Result<Vec<ScoredMessage>, DomainError> {
        let query_vector = self.embeddings.generate_embedding(query, None).await?;
        let threshold = params.threshold.unwrap_or(self.config.default_threshold);
        let filter = params.filter();

        if self.store.supports_native_search() {
            let oversampled = params.limit * self.config.native_oversample;

            match self.store.search(&query_vector, &filter, oversampled).await {
                Ok(results) => return Ok(rank(results, threshold, params.limit)),
                Err(error) => {
                    warn!(
                        error = %error,
                        "Native vector search failed; falling back to in-process scan"
                    );
                }
            }
        }

        // O(candidates x dimension) per query; the candidate cap keeps this
        // viable only while per-user volume stays small.
        let cap = params.limit * self.config.fallback_oversample;
        let candidates = self.store.fetch_candidates(&filter, cap).await?;

        debug!(
            candidates = candidates.len(),
            "Scoring candidates in process"
        );

        let scored = candidates
            .into_iter()
            .map(|message| {
                let similarity = cosine_similarity(&query_vector, &message.embedding);
                ScoredMessage::new(message, similarity)
            })
            .collect();

        Ok(rank(scored, threshold, params.limit))
    }

    /// Merges the most recent messages (continuity) with the top semantic
    /// matches (relevance), de-duplicated by content prefix and ordered
    /// chronologically - ready to feed a generation call.
    pub async fn get_relevant_context(
        &self,
        query: &str,
        params: &RelevantContextParams,
    ) -> Result<Vec<MessageEmbedding>, DomainError> {
        let recent = match self
            .store
            .find_recent(
                &params.user_id,
                params.conversation_id.as_deref(),
                params.recent_limit,
            )
            .await
        {
            Ok(messages) => messages,
            Err(error) => {
                warn!(
                    error = %error,
                    "Failed to fetch recent messages; continuing with semantic matches only"
                );
                Vec::new()
            }
        };

        let mut similar_params = SimilarContextParams::for_user(params.user_id.clone())
            .with_limit(params.semantic_limit);

        if let Some(ref conversation_id) = params.conversation_id {
            similar_params = similar_params.with_conversation(conversation_id.clone());
        }

        if let Some(threshold) = params.threshold {
            similar_params = similar_params.with_threshold(threshold);
        }

        let semantic = self.find_similar_context(query, &similar_params).await?;

        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for message in recent
            .into_iter()
            .chain(semantic.into_iter().map(|scored| scored.message))
        {
            let key = content_prefix(&message.content, self.config.dedup_prefix_chars);
            if seen.insert(key) {
                merged.push(message);
            }
        }

        merged.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(merged)
    }

    /// Best-effort cascade cleanup when a conversation is deleted.
    pub async fn delete_conversation_embeddings(&self, conversation_id: &str) -> usize {
        match self.store.delete_by_conversation(conversation_id).await {
            Ok(count) => count,
            Err(error) => {
                warn!(
                    error = %error,
                    conversation_id,
                    "Failed to delete conversation embeddings"
                );
                0
            }
        }
    }

    /// Best-effort cascade cleanup when a message is deleted.
    pub async fn delete_message_embedding(&self, message_id: &str) -> bool {
        match self.store.delete_by_message(message_id).await {
            Ok(deleted) => deleted,
            Err(error) => {
                warn!(error = %error, message_id, "Failed to delete message embedding");
                false
            }
        }
    }

    async fn embed_and_insert(
        &self,
        entry: ContextEntry,
    ) -> Result<Option<MessageEmbedding>, DomainError> {
        if entry.role.is_system() {
            return Ok(None);
        }

        let vector = self
            .embeddings
            .generate_embedding(&entry.content, None)
            .await?;

        let record = MessageEmbedding::from_entry(entry, vector);
        self.store.insert(record.clone()).await?;

        Ok(Some(record))
    }
}

/// Threshold, sort descending, cap - both retrieval paths produce the
/// same shape.
fn rank(mut results: Vec<ScoredMessage>, threshold: f32, limit: usize) -> Vec<ScoredMessage> {
    results.retain(|result| result.similarity >= threshold);
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}

fn content_prefix(content: &str, chars: usize) -> String {
    content
        .trim()
        .chars()
        .take(chars)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::MessageRole;
    use crate::domain::embedding::MockEmbeddingBackend;
    use crate::infrastructure::context::InMemoryMessageStore;

    fn service_with(
        backend: MockEmbeddingBackend,
    ) -> (ContextService, Arc<InMemoryMessageStore>) {
        let store = Arc::new(InMemoryMessageStore::new());
        let embeddings = Arc::new(EmbeddingGenerator::new(Arc::new(backend), None));
        let service = ContextService::new(store.clone(), embeddings);
        (service, store)
    }

    fn entry(message_id: &str, role: MessageRole, content: &str) -> ContextEntry {
        ContextEntry::new("user-1", "conv-1", message_id, role, content)
    }

    async fn seed(store: &InMemoryMessageStore, message_id: &str, content: &str, vector: Vec<f32>) {
        let record =
            MessageEmbedding::from_entry(entry(message_id, MessageRole::User, content), vector);
        store.insert(record).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_message_embedding() {
        let (service, store) = service_with(MockEmbeddingBackend::new("mock", 8));

        let outcome = service
            .store_message_embedding(entry("m1", MessageRole::User, "hello there"))
            .await;

        assert!(matches!(outcome, StoreOutcome::Stored(_)));

        let filter = ContextFilter::for_user("user-1");
        assert_eq!(store.fetch_candidates(&filter, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_system_messages_skipped() {
        let (service, store) = service_with(MockEmbeddingBackend::new("mock", 8));

        let outcome = service
            .store_message_embedding(entry("m1", MessageRole::System, "You are helpful"))
            .await;

        assert_eq!(outcome, StoreOutcome::SkippedSystemRole);

        let filter = ContextFilter::for_user("user-1");
        assert!(store.fetch_candidates(&filter, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_absorbed() {
        let (service, _store) =
            service_with(MockEmbeddingBackend::new("mock", 8).with_error("backend down"));

        let outcome = service
            .store_message_embedding(entry("m1", MessageRole::User, "hello"))
            .await;

        assert_eq!(outcome, StoreOutcome::Failed);
    }

    #[tokio::test]
    async fn test_batch_tolerates_individual_failures() {
        let (service, _store) =
            service_with(MockEmbeddingBackend::new("mock", 8).with_error_on("poison"));

        let stored = service
            .store_message_embeddings_batch(vec![
                entry("m1", MessageRole::User, "fine"),
                entry("m2", MessageRole::User, "poison"),
                entry("m3", MessageRole::Assistant, "also fine"),
            ])
            .await;

        let ids: Vec<&str> = stored.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"m1"));
        assert!(ids.contains(&"m3"));
    }

    #[tokio::test]
    async fn test_topic_scoped_similarity_search() {
        // Five prior messages on topics A, A, B, B, C; the query sits next
        // to topic A in embedding space.
        let backend = MockEmbeddingBackend::new("mock", 3)
            .with_vector("tell me about apples", vec![1.0, 0.0, 0.0]);
        let (service, store) = service_with(backend);

        seed(&store, "a1", "apples are red", vec![0.95, 0.05, 0.0]).await;
        seed(&store, "a2", "apple pie recipe", vec![0.9, 0.1, 0.0]).await;
        seed(&store, "b1", "bikes have wheels", vec![0.0, 1.0, 0.0]).await;
        seed(&store, "b2", "bike maintenance", vec![0.1, 0.9, 0.0]).await;
        seed(&store, "c1", "cats sleep all day", vec![0.0, 0.0, 1.0]).await;

        let params = SimilarContextParams::for_user("user-1")
            .with_limit(2)
            .with_threshold(0.7);
        let results = service
            .find_similar_context("tell me about apples", &params)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message.message_id, "a1");
        assert_eq!(results[1].message.message_id, "a2");
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[tokio::test]
    async fn test_degraded_path_respects_threshold_and_limit() {
        let backend =
            MockEmbeddingBackend::new("mock", 3).with_vector("query", vec![1.0, 0.0, 0.0]);
        let (service, store) = service_with(backend);

        seed(&store, "hit", "close match", vec![0.99, 0.1, 0.0]).await;
        seed(&store, "miss", "far away", vec![0.0, 1.0, 0.0]).await;

        // The in-memory store has no native index, so this exercises the
        // brute-force path end to end.
        assert!(!store.supports_native_search());

        let params = SimilarContextParams::for_user("user-1")
            .with_limit(5)
            .with_threshold(0.7);
        let results = service.find_similar_context("query", &params).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message.message_id, "hit");
    }

    #[tokio::test]
    async fn test_exclusions_are_honoured() {
        let backend =
            MockEmbeddingBackend::new("mock", 3).with_vector("query", vec![1.0, 0.0, 0.0]);
        let (service, store) = service_with(backend);

        seed(&store, "m1", "first match", vec![1.0, 0.0, 0.0]).await;
        seed(&store, "m2", "second match", vec![0.98, 0.02, 0.0]).await;

        let params = SimilarContextParams::for_user("user-1")
            .with_threshold(0.5)
            .excluding(vec!["m1".to_string()]);
        let results = service.find_similar_context("query", &params).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message.message_id, "m2");
    }

    #[tokio::test]
    async fn test_relevant_context_merges_without_duplicates() {
        let backend = MockEmbeddingBackend::new("mock", 3)
            .with_vector("about apples", vec![1.0, 0.0, 0.0]);
        let (service, store) = service_with(backend);

        // This message is both recent and the best semantic match.
        seed(&store, "m1", "apples are red", vec![1.0, 0.0, 0.0]).await;
        seed(&store, "m2", "unrelated chatter", vec![0.0, 1.0, 0.0]).await;

        let params = RelevantContextParams::for_user("user-1").with_threshold(0.5);
        let context = service
            .get_relevant_context("about apples", &params)
            .await
            .unwrap();

        assert_eq!(context.len(), 2);

        let apple_count = context
            .iter()
            .filter(|m| m.content == "apples are red")
            .count();
        assert_eq!(apple_count, 1);
    }

    #[tokio::test]
    async fn test_relevant_context_is_chronological() {
        let backend =
            MockEmbeddingBackend::new("mock", 3).with_vector("query", vec![1.0, 0.0, 0.0]);
        let (service, store) = service_with(backend);

        let mut older = MessageEmbedding::from_entry(
            entry("m1", MessageRole::User, "older message"),
            vec![0.0, 1.0, 0.0],
        );
        older.created_at = chrono::Utc::now() - chrono::Duration::minutes(10);
        store.insert(older).await.unwrap();

        let newer = MessageEmbedding::from_entry(
            entry("m2", MessageRole::Assistant, "newer message"),
            vec![0.0, 0.9, 0.1],
        );
        store.insert(newer).await.unwrap();

        let params = RelevantContextParams::for_user("user-1");
        let context = service.get_relevant_context("query", &params).await.unwrap();

        assert_eq!(context.len(), 2);
        assert_eq!(context[0].message_id, "m1");
        assert_eq!(context[1].message_id, "m2");
    }

    #[tokio::test]
    async fn test_query_embedding_failure_propagates() {
        let (service, _store) =
            service_with(MockEmbeddingBackend::new("mock", 3).with_error("exhausted"));

        let params = SimilarContextParams::for_user("user-1");
        assert!(service.find_similar_context("query", &params).await.is_err());
    }

    #[tokio::test]
    async fn test_cascade_deletes() {
        let (service, store) = service_with(MockEmbeddingBackend::new("mock", 8));

        service
            .store_message_embedding(entry("m1", MessageRole::User, "one"))
            .await;
        service
            .store_message_embedding(entry("m2", MessageRole::User, "two"))
            .await;

        assert!(service.delete_message_embedding("m1").await);
        assert!(!service.delete_message_embedding("m1").await);

        assert_eq!(service.delete_conversation_embeddings("conv-1").await, 1);

        let filter = ContextFilter::for_user("user-1");
        assert!(store.fetch_candidates(&filter, 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_rank_orders_and_caps() {
        let make = |id: &str, similarity: f32| {
            ScoredMessage::new(
                MessageEmbedding::from_entry(
                    ContextEntry::new("u", "c", id, MessageRole::User, id),
                    vec![0.0],
                ),
                similarity,
            )
        };

        let ranked = rank(
            vec![make("low", 0.72), make("high", 0.99), make("out", 0.3)],
            0.7,
            5,
        );

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].message.message_id, "high");
    }

    #[test]
    fn test_content_prefix_normalizes() {
        assert_eq!(content_prefix("  Hello World  ", 5), "hello");
        assert_eq!(content_prefix("short", 80), "short");
    }
}
