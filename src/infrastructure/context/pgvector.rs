//! pgvector-backed embedding store implementation

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgPool;

use crate::domain::DomainError;
use crate::domain::context::{ContextFilter, EmbeddingStore, MessageEmbedding, ScoredMessage};

/// Configuration for the pgvector message store
#[derive(Debug, Clone)]
pub struct PgVectorStoreConfig {
    /// Embedding dimensions
    pub dimensions: u32,
    /// Table name for storing message embeddings
    pub table_name: String,
}

impl PgVectorStoreConfig {
    pub fn new(dimensions: u32) -> Self {
        Self {
            dimensions,
            table_name: "message_embeddings".to_string(),
        }
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }
}

/// Postgres store with a native pgvector nearest-neighbour index.
///
/// Cosine distance (`<=>`) is converted to similarity as `1 - distance`.
#[derive(Debug)]
pub struct PgVectorMessageStore {
    pool: PgPool,
    config: PgVectorStoreConfig,
}

impl PgVectorMessageStore {
    pub fn new(pool: PgPool, config: PgVectorStoreConfig) -> Self {
        Self { pool, config }
    }

    /// Ensure the vector table and its indexes exist.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to create vector extension: {}", e))
            })?;

        let table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                user_id VARCHAR(255) NOT NULL,
                conversation_id VARCHAR(255) NOT NULL,
                message_id VARCHAR(255) NOT NULL UNIQUE,
                role VARCHAR(16) NOT NULL,
                content TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.config.table_name, self.config.dimensions
        );

        sqlx::query(&table)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to create table: {}", e)))?;

        for column in ["user_id", "conversation_id"] {
            let index = format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({})",
                self.config.table_name, column, self.config.table_name, column
            );

            sqlx::query(&index)
                .execute(&self.pool)
                .await
                .map_err(|e| DomainError::storage(format!("Failed to create index: {}", e)))?;
        }

        // IVFFlat needs data to build its lists; ignore errors on an empty
        // table.
        let vector_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_embedding ON {} USING ivfflat (embedding vector_cosine_ops)",
            self.config.table_name, self.config.table_name
        );
        let _ = sqlx::query(&vector_index).execute(&self.pool).await;

        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<MessageEmbedding, DomainError> {
        let role: String = row.get("role");
        let embedding_str: String = row.get("embedding");

        Ok(MessageEmbedding {
            id: row.get("id"),
            user_id: row.get("user_id"),
            conversation_id: row.get("conversation_id"),
            message_id: row.get("message_id"),
            role: role
                .parse()
                .map_err(|e: String| DomainError::storage(e))?,
            content: row.get("content"),
            embedding: parse_pgvector(&embedding_str)?,
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
        })
    }
}

/// Render an embedding as a pgvector literal
fn embedding_to_pgvector(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Parse a pgvector string representation back to a Vec<f32>
fn parse_pgvector(s: &str) -> Result<Vec<f32>, DomainError> {
    let trimmed = s.trim_start_matches('[').trim_end_matches(']');

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|e| DomainError::storage(format!("Failed to parse vector: {}", e)))
}

/// Build the WHERE clause tail for a filter, after the mandatory
/// `user_id = $1` predicate. Values are embedded in the SQL string; string
/// values are single-quote escaped.
fn filter_to_sql(filter: &ContextFilter) -> String {
    let mut clauses = String::new();

    if let Some(ref conversation_id) = filter.conversation_id {
        clauses.push_str(&format!(
            " AND conversation_id = '{}'",
            escape_sql(conversation_id)
        ));
    }

    if let Some(ref metadata) = filter.metadata {
        let json = escape_sql(&metadata.to_string());
        clauses.push_str(&format!(" AND metadata @> '{}'::jsonb", json));
    }

    if !filter.exclude_message_ids.is_empty() {
        let ids: Vec<String> = filter
            .exclude_message_ids
            .iter()
            .map(|id| format!("'{}'", escape_sql(id)))
            .collect();
        clauses.push_str(&format!(" AND message_id NOT IN ({})", ids.join(", ")));
    }

    clauses
}

fn escape_sql(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl EmbeddingStore for PgVectorMessageStore {
    async fn insert(&self, record: MessageEmbedding) -> Result<(), DomainError> {
        let embedding_str = embedding_to_pgvector(&record.embedding);

        let query = format!(
            r#"
            INSERT INTO {} (id, user_id, conversation_id, message_id, role, content, embedding, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, '{}'::vector, $7, $8)
            ON CONFLICT (message_id) DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                metadata = EXCLUDED.metadata
            "#,
            self.config.table_name, embedding_str
        );

        sqlx::query(&query)
            .bind(record.id)
            .bind(&record.user_id)
            .bind(&record.conversation_id)
            .bind(&record.message_id)
            .bind(record.role.as_str())
            .bind(&record.content)
            .bind(&record.metadata)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to insert embedding: {}", e)))?;

        Ok(())
    }

    fn supports_native_search(&self) -> bool {
        true
    }

    async fn search(
        &self,
        query: &[f32],
        filter: &ContextFilter,
        limit: usize,
    ) -> Result<Vec<ScoredMessage>, DomainError> {
        let embedding_str = embedding_to_pgvector(query);
        let filter_sql = filter_to_sql(filter);

        let sql = format!(
            r#"
            SELECT
                id, user_id, conversation_id, message_id, role, content,
                embedding::text as embedding, metadata, created_at,
                embedding <=> '{}' as distance
            FROM {}
            WHERE user_id = $1{}
            ORDER BY distance
            LIMIT {}
            "#,
            embedding_str, self.config.table_name, filter_sql, limit
        );

        let rows = sqlx::query(&sql)
            .bind(&filter.user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Native vector search failed");
                DomainError::storage(format!("Vector search failed: {}", e))
            })?;

        let mut results = Vec::with_capacity(rows.len());

        for row in &rows {
            let distance: f64 = row.get("distance");
            let record = Self::row_to_record(row)?;
            results.push(ScoredMessage::new(record, (1.0 - distance) as f32));
        }

        Ok(results)
    }

    async fn fetch_candidates(
        &self,
        filter: &ContextFilter,
        cap: usize,
    ) -> Result<Vec<MessageEmbedding>, DomainError> {
        let filter_sql = filter_to_sql(filter);

        let sql = format!(
            r#"
            SELECT id, user_id, conversation_id, message_id, role, content,
                   embedding::text as embedding, metadata, created_at
            FROM {}
            WHERE user_id = $1{}
            ORDER BY created_at DESC
            LIMIT {}
            "#,
            self.config.table_name, filter_sql, cap
        );

        let rows = sqlx::query(&sql)
            .bind(&filter.user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to fetch candidates: {}", e)))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn find_recent(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageEmbedding>, DomainError> {
        let conversation_sql = match conversation_id {
            Some(id) => format!(" AND conversation_id = '{}'", escape_sql(id)),
            None => String::new(),
        };

        let sql = format!(
            r#"
            SELECT id, user_id, conversation_id, message_id, role, content,
                   embedding::text as embedding, metadata, created_at
            FROM {}
            WHERE user_id = $1{}
            ORDER BY created_at DESC
            LIMIT {}
            "#,
            self.config.table_name, conversation_sql, limit
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to fetch recent messages: {}", e)))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete_by_conversation(&self, conversation_id: &str) -> Result<usize, DomainError> {
        let sql = format!(
            "DELETE FROM {} WHERE conversation_id = $1",
            self.config.table_name
        );

        let result = sqlx::query(&sql)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to delete conversation embeddings: {}", e))
            })?;

        Ok(result.rows_affected() as usize)
    }

    async fn delete_by_message(&self, message_id: &str) -> Result<bool, DomainError> {
        let sql = format!(
            "DELETE FROM {} WHERE message_id = $1",
            self.config.table_name
        );

        let result = sqlx::query(&sql)
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to delete message embedding: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config() {
        let config = PgVectorStoreConfig::new(1536).with_table_name("ctx_vectors");

        assert_eq!(config.dimensions, 1536);
        assert_eq!(config.table_name, "ctx_vectors");
    }

    #[test]
    fn test_embedding_literal_round_trip() {
        let original = vec![0.25, -1.5, 3.0];
        let literal = embedding_to_pgvector(&original);

        assert_eq!(literal, "[0.25,-1.5,3]");
        assert_eq!(parse_pgvector(&literal).unwrap(), original);
    }

    #[test]
    fn test_parse_pgvector_with_spaces() {
        let parsed = parse_pgvector("[0.1, 0.2, 0.3]").unwrap();
        assert_eq!(parsed.len(), 3);
        assert!((parsed[1] - 0.2).abs() < 0.0001);
    }

    #[test]
    fn test_filter_sql_conversation_and_exclusions() {
        let filter = crate::domain::ContextFilter::for_user("user-1")
            .with_conversation("conv-7")
            .excluding(vec!["m1".to_string(), "m2".to_string()]);

        let sql = filter_to_sql(&filter);

        assert!(sql.contains("conversation_id = 'conv-7'"));
        assert!(sql.contains("message_id NOT IN ('m1', 'm2')"));
    }

    #[test]
    fn test_filter_sql_metadata_containment() {
        let filter = crate::domain::ContextFilter::for_user("user-1")
            .with_metadata(serde_json::json!({"type": "draft"}));

        let sql = filter_to_sql(&filter);
        assert!(sql.contains(r#"metadata @> '{"type":"draft"}'::jsonb"#));
    }

    #[test]
    fn test_filter_sql_escapes_quotes() {
        let filter = crate::domain::ContextFilter::for_user("user-1")
            .with_conversation("it's");

        let sql = filter_to_sql(&filter);
        assert!(sql.contains("'it''s'"));
    }

    #[test]
    fn test_empty_filter_adds_nothing() {
        let filter = crate::domain::ContextFilter::for_user("user-1");
        assert!(filter_to_sql(&filter).is_empty());
    }
}
