//! Embedding backend trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

/// An embedding backend mapping text to fixed-dimension vectors.
///
/// All backends wired into one deployment must produce vectors of the same
/// length; records written under a previous backend generation become
/// incomparable if the dimensionality changes.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync + Debug {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    /// Embed several texts in one call. Only meaningful when
    /// `supports_batch` is true.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError>;

    /// Whether the backend accepts a multi-input call
    fn supports_batch(&self) -> bool;

    /// Longest input accepted; callers truncate rather than reject
    fn max_input_chars(&self) -> usize;

    /// Vector length produced by this backend
    fn dimensions(&self) -> usize;

    /// Get the backend name
    fn name(&self) -> &'static str;
}
