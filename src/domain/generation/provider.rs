use std::fmt::Debug;

use async_trait::async_trait;

use super::{GenerationRequest, GenerationResponse};
use crate::domain::DomainError;

/// A ranked generation backend (OpenAI, Anthropic, ...).
///
/// A provider may try several named model variants internally before
/// declaring failure; the first variant producing a usable response wins.
/// A provider constructed without credentials must fail fast with a
/// configuration error so fallback chains skip it silently.
#[async_trait]
pub trait GenerationProvider: Send + Sync + Debug {
    /// Produce text for the request, falling back across model variants.
    async fn generate(&self, request: &GenerationRequest)
    -> Result<GenerationResponse, DomainError>;

    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Model variants tried in order by `generate`
    fn model_variants(&self) -> Vec<&'static str>;
}
