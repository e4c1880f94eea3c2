//! OpenAI embedding backend implementation

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{DomainError, EmbeddingBackend};
use crate::infrastructure::generation::HttpClientTrait;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const MAX_INPUT_CHARS: usize = 8_000;

/// Known OpenAI embedding models and their dimensions
const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// OpenAI embedding backend with native multi-input support.
#[derive(Debug)]
pub struct OpenAiEmbeddingBackend<C: HttpClientTrait> {
    client: C,
    auth_header: Option<String>,
    base_url: String,
    model: String,
}

impl<C: HttpClientTrait> OpenAiEmbeddingBackend<C> {
    pub fn new(client: C, api_key: Option<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_OPENAI_BASE_URL)
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

    async fn request(&self, input: serde_json::Value) -> Result<Vec<Vec<f32>>, DomainError> {
        let auth_header = self
            .auth_header
            .as_deref()
            .ok_or_else(|| DomainError::configuration("OpenAI API key not configured"))?;

        let headers = vec![
            ("Authorization", auth_header),
            ("Content-Type", "application/json"),
        ];

        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let json = self
            .client
            .post_json(&self.embeddings_url(), headers, &body)
            .await?;

        let response: OpenAiEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("openai", format!("Failed to parse embedding response: {}", e))
        })?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingBackend for OpenAiEmbeddingBackend<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let mut vectors = self.request(serde_json::json!(text)).await?;

        if vectors.is_empty() {
            return Err(DomainError::provider("openai", "Response contained no embedding"));
        }

        Ok(vectors.swap_remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let vectors = self.request(serde_json::json!(texts)).await?;

        if vectors.len() != texts.len() {
            return Err(DomainError::provider(
                "openai",
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
            .unwrap_or(1536)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// OpenAI API types for embeddings

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
