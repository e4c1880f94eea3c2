use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters for a single text-generation call.
///
/// Ephemeral - requests are never persisted, only hashed into a cache key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The user prompt to complete
    pub prompt: String,
    /// Instruction prefixed to the generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Sampling randomness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output length cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Seconds to retain the cached response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
    /// Backend-specific model override; bypasses the variant list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            cache_ttl_secs: None,
            model: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = Some(ttl.as_secs());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Cache retention for the response, if requested.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = GenerationRequest::new("Hello");

        assert_eq!(request.prompt, "Hello");
        assert!(request.system_prompt.is_none());
        assert!(request.cache_ttl().is_none());
    }

    #[test]
    fn test_request_builder_chain() {
        let request = GenerationRequest::new("Summarize this contract")
            .with_system_prompt("You are a legal drafting assistant")
            .with_temperature(0.4)
            .with_max_tokens(512)
            .with_cache_ttl(Duration::from_secs(600));

        assert_eq!(request.temperature, Some(0.4));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.cache_ttl(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_model_override() {
        let request = GenerationRequest::new("ping").with_model("gpt-4o-mini");
        assert_eq!(request.model.as_deref(), Some("gpt-4o-mini"));
    }
}
