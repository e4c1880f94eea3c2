//! Voyage AI embedding backend implementation

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{DomainError, EmbeddingBackend};
use crate::infrastructure::generation::HttpClientTrait;

const DEFAULT_VOYAGE_BASE_URL: &str = "https://api.voyageai.com";
const DEFAULT_MODEL: &str = "voyage-3";
const MAX_INPUT_CHARS: usize = 8_000;

/// Known Voyage embedding models and their dimensions
const EMBEDDING_MODELS: &[(&str, usize)] = &[("voyage-3", 1024), ("voyage-3-lite", 512)];

/// Voyage AI embedding backend; the alternate to OpenAI.
///
/// The input is always sent as an array, so single and batch calls share
/// one request path.
#[derive(Debug)]
pub struct VoyageEmbeddingBackend<C: HttpClientTrait> {
    client: C,
    auth_header: Option<String>,
    base_url: String,
    model: String,
}

impl<C: HttpClientTrait> VoyageEmbeddingBackend<C> {
    pub fn new(client: C, api_key: Option<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_VOYAGE_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth_header: api_key.map(|key| format!("Bearer {}", key)),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let auth_header = self
            .auth_header
            .as_deref()
            .ok_or_else(|| DomainError::configuration("Voyage API key not configured"))?;

        let headers = vec![
            ("Authorization", auth_header),
            ("Content-Type", "application/json"),
        ];

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = self
            .client
            .post_json(&self.embeddings_url(), headers, &body)
            .await?;

        let response: VoyageEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("voyage", format!("Failed to parse embedding response: {}", e))
        })?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingBackend for VoyageEmbeddingBackend<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let input = vec![text.to_string()];
        let mut vectors = self.request(&input).await?;

        if vectors.is_empty() {
            return Err(DomainError::provider("voyage", "Response contained no embedding"));
        }

        Ok(vectors.swap_remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let vectors = self.request(texts).await?;

        if vectors.len() != texts.len() {
            return Err(DomainError::provider(
                "voyage",
                format!(
                    "Embedding count mismatch: expected {}, got {}",
                    texts.len(),
                    vectors.len()
                ),
            ));
        }

        Ok(vectors)
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn max_input_chars(&self) -> usize {
        MAX_INPUT_CHARS
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_MODELS
            .iter()
            .find(|(name, _)| *name == self.model)
            .map(|(_, dims)| *dims)
            .unwrap_or(1024)
    }

    fn name(&self) -> &'static str {
        "voyage"
    }
}

// Voyage API types

#[derive(Debug, Deserialize)]
struct VoyageEmbeddingResponse {
    data: Vec<VoyageEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct VoyageEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
