//! Embedding generation with two-tier backend fallback

use std::borrow::Cow;
use std::sync::Arc;

use tracing::warn;

use crate::domain::{DomainError, EmbeddingBackend};

/// Maps text to fixed-dimension vectors via interchangeable backends.
///
/// No caching: embeddings are normally generated once and persisted by
/// the caller. Overlong input is truncated to the backend maximum rather
/// than rejected.
#[derive(Debug)]
pub struct EmbeddingGenerator {
    backends: Vec<Arc<dyn EmbeddingBackend>>,
}

impl EmbeddingGenerator {
    pub fn new(
        primary: Arc<dyn EmbeddingBackend>,
        secondary: Option<Arc<dyn EmbeddingBackend>>,
    ) -> Self {
        let mut backends = vec![primary];
        backends.extend(secondary);

        Self { backends }
    }

    /// Vector length produced by the primary backend.
    pub fn dimensions(&self) -> usize {
        self.backends
            .first()
            .map(|backend| backend.dimensions())
            .unwrap_or(0)
    }

    /// Embed one text, preferring the named backend when given.
    pub async fn generate_embedding(
        &self,
        text: &str,
        preferred: Option<&str>,
    ) -> Result<Vec<f32>, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::validation("Cannot embed empty text"));
        }

        let mut last_error = None;

        for backend in self.ordered(preferred) {
            let input = truncate_input(text, backend.max_input_chars());

            match backend.embed(&input).await {
                Ok(vector) => return Ok(vector),
                Err(error) => {
                    warn!(
                        backend = backend.name(),
                        error_kind = error.kind(),
                        error = %error,
                        "Embedding backend failed; trying alternate"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DomainError::configuration("No embedding backends configured")))
    }

    /// Embed several texts. Uses a backend's multi-input call when it has
    /// one; a failed batch call degrades to sequential per-text calls
    /// before the alternate backend is tried.
    pub async fn generate_embeddings_batch(
        &self,
        texts: &[String],
        preferred: Option<&str>,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_error = None;

        for backend in self.ordered(preferred) {
            let truncated: Vec<String> = texts
                .iter()
                .map(|text| truncate_input(text, backend.max_input_chars()).into_owned())
                .collect();

            if backend.supports_batch() {
                match backend.embed_batch(&truncated).await {
                    Ok(vectors) => return Ok(vectors),
                    Err(error) => {
                        warn!(
                            backend = backend.name(),
                            error = %error,
                            "Batch embedding call failed; degrading to sequential"
                        );
                        last_error = Some(error);
                    }
                }
            }

            match sequential_embed(backend.as_ref(), &truncated).await {
                Ok(vectors) => return Ok(vectors),
                Err(error) => {
                    warn!(
                        backend = backend.name(),
                        error = %error,
                        "Sequential embedding failed; trying alternate backend"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DomainError::configuration("No embedding backends configured")))
    }

    /// Backends in call order, with the preferred one (if known) first.
    fn ordered(&self, preferred: Option<&str>) -> Vec<Arc<dyn EmbeddingBackend>> {
        let mut ordered = self.backends.clone();

        if let Some(name) = preferred {
            if let Some(position) = ordered.iter().position(|b| b.name() == name) {
                let backend = ordered.remove(position);
                ordered.insert(0, backend);
            }
        }

        ordered
    }
}

async fn sequential_embed(
    backend: &dyn EmbeddingBackend,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, DomainError> {
    let mut vectors = Vec::with_capacity(texts.len());

    for text in texts {
        vectors.push(backend.embed(text).await?);
    }

    Ok(vectors)
}

/// Truncates to the backend's accepted maximum; favors availability over
/// completeness.
fn truncate_input(text: &str, max_chars: usize) -> Cow<'_, str> {
    if text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }

    Cow::Owned(text.chars().take(max_chars).collect())
}
