use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http_client::HttpClientTrait;
use crate::domain::{
    DomainError, GenerationProvider, GenerationRequest, GenerationResponse, Usage,
};

const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Model variants tried in order when the request carries no override
const ANTHROPIC_MODEL_VARIANTS: &[&str] =
    &["claude-sonnet-4-20250514", "claude-3-5-haiku-20241022"];

/// Anthropic messages-API provider.
#[derive(Debug)]
pub struct AnthropicProvider<C: HttpClientTrait> {
    client: C,
    api_key: Option<String>,
    base_url: String,
}

impl<C: HttpClientTrait> AnthropicProvider<C> {
    pub fn new(client: C, api_key: Option<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_ANTHROPIC_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn build_request(&self, model: &str, request: &GenerationRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": request.prompt}],
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if let Some(ref system) = request.system_prompt {
            body["system"] = serde_json::json!(system);
        }

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        body
    }

    fn parse_response(
        &self,
        model: &str,
        json: serde_json::Value,
    ) -> Result<GenerationResponse, DomainError> {
        let response: AnthropicResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("anthropic", format!("Failed to parse response: {}", e))
        })?;

        let text = response
            .content
            .into_iter()
            .filter_map(|block| {
                if block.content_type == "text" {
                    block.text
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(DomainError::provider(
                "anthropic",
                "Response contained no text",
            ));
        }

        let generation = GenerationResponse::new("anthropic", model, text).with_usage(Usage::new(
            response.usage.input_tokens,
            response.usage.output_tokens,
        ));

        Ok(generation)
    }

    async fn complete(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, DomainError> {
        let headers = vec![
            ("x-api-key", api_key),
            ("anthropic-version", ANTHROPIC_VERSION),
            ("Content-Type", "application/json"),
        ];

        let body = self.build_request(model, request);
        let json = self
            .client
            .post_json(&self.messages_url(), headers, &body)
            .await?;

        self.parse_response(model, json)
    }
}

#[async_trait]
impl<C: HttpClientTrait> GenerationProvider for AnthropicProvider<C> {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, DomainError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DomainError::configuration("Anthropic API key not configured"))?;

        // An explicit model override bypasses the variant list.
        if let Some(model) = request.model.as_deref() {
            return self.complete(api_key, model, request).await;
        }

        let mut last_error = None;

        for model in ANTHROPIC_MODEL_VARIANTS.iter().copied() {
            match self.complete(api_key, model, request).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    debug!(model, error = %error, "Anthropic model variant failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DomainError::provider("anthropic", "No model variants configured")))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model_variants(&self) -> Vec<&'static str> {
        ANTHROPIC_MODEL_VARIANTS.to_vec()
    }
}

// Anthropic API types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::generation::http_client::mock::MockHttpClient;

    const TEST_URL: &str = "https://api.anthropic.com/v1/messages";

    fn messages_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 10}
        })
    }

    #[tokio::test]
    async fn test_generate() {
        let client = MockHttpClient::new().with_response(TEST_URL, messages_response("Hello!"));
        let provider = AnthropicProvider::new(client, Some("sk-ant-test".to_string()));

        let request = GenerationRequest::new("Hi").with_system_prompt("Be helpful");
        let response = provider.generate(&request).await.unwrap();

        assert_eq!(response.provider, "anthropic");
        assert_eq!(response.model, "claude-sonnet-4-20250514");
        assert_eq!(response.text, "Hello!");
        assert_eq!(response.usage.unwrap().total_tokens, 22);
    }

    #[tokio::test]
    async fn test_system_prompt_sent_as_top_level_field() {
        let client = MockHttpClient::new().with_response(TEST_URL, messages_response("ok"));
        let provider = AnthropicProvider::new(client, Some("sk-ant-test".to_string()));

        let request = GenerationRequest::new("Hi").with_system_prompt("You draft contracts");
        provider.generate(&request).await.unwrap();
    }

    #[tokio::test]
    async fn test_variant_fallback() {
        let client = MockHttpClient::new()
            .with_error_when(r#""model":"claude-sonnet-4-20250514""#, "overloaded")
            .with_response(TEST_URL, messages_response("haiku says hi"));
        let provider = AnthropicProvider::new(client, Some("sk-ant-test".to_string()));

        let response = provider
            .generate(&GenerationRequest::new("Hi"))
            .await
            .unwrap();

        assert_eq!(response.model, "claude-3-5-haiku-20241022");
    }

    #[tokio::test]
    async fn test_unconfigured_fails_fast() {
        let client = MockHttpClient::new();
        let provider = AnthropicProvider::new(client, None);

        let error = provider
            .generate(&GenerationRequest::new("Hi"))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), "configuration");
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let empty = serde_json::json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [],
            "usage": {"input_tokens": 1, "output_tokens": 0}
        });
        let client = MockHttpClient::new().with_response(TEST_URL, empty);
        let provider = AnthropicProvider::new(client, Some("sk-ant-test".to_string()));

        let result = provider.generate(&GenerationRequest::new("Hi")).await;
        assert!(result.is_err());
    }
}
