use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http_client::HttpClientTrait;
use crate::domain::{
    DomainError, GenerationProvider, GenerationRequest, GenerationResponse, Usage,
};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Model variants tried in order when the request carries no override
const OPENAI_MODEL_VARIANTS: &[&str] = &["gpt-4o", "gpt-4o-mini"];

/// OpenAI chat-completions provider.
///
/// Constructed without an API key it is unconfigured: every call fails
/// fast with a configuration error and fallback chains skip it.
#[derive(Debug)]
pub struct OpenAiProvider<C: HttpClientTrait> {
    client: C,
    auth_header: Option<String>,
    base_url: String,
}

impl<C: HttpClientTrait> OpenAiProvider<C> {
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
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request(&self, model: &str, request: &GenerationRequest) -> serde_json::Value {
        let mut messages = Vec::new();

        if let Some(ref system) = request.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }

        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    fn parse_response(
        &self,
        model: &str,
        json: serde_json::Value,
    ) -> Result<GenerationResponse, DomainError> {
        let response: OpenAiChatResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("openai", format!("Failed to parse response: {}", e))
        })?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| DomainError::provider("openai", "Response contained no text"))?;

        let mut generation = GenerationResponse::new("openai", model, text);

        if let Some(usage) = response.usage {
            generation =
                generation.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        Ok(generation)
    }

    async fn complete(
        &self,
        auth_header: &str,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, DomainError> {
        let headers = vec![
            ("Authorization", auth_header),
            ("Content-Type", "application/json"),
        ];

        let body = self.build_request(model, request);
        let json = self
            .client
            .post_json(&self.completions_url(), headers, &body)
            .await?;

        self.parse_response(model, json)
    }
}

#[async_trait]
impl<C: HttpClientTrait> GenerationProvider for OpenAiProvider<C> {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, DomainError> {
        let auth_header = self
            .auth_header
            .as_deref()
            .ok_or_else(|| DomainError::configuration("OpenAI API key not configured"))?;

        // An explicit model override bypasses the variant list.
        if let Some(model) = request.model.as_deref() {
            return self.complete(auth_header, model, request).await;
        }

        let mut last_error = None;

        for model in OPENAI_MODEL_VARIANTS.iter().copied() {
            match self.complete(auth_header, model, request).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    debug!(model, error = %error, "OpenAI model variant failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DomainError::provider("openai", "No model variants configured")))
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn model_variants(&self) -> Vec<&'static str> {
        OPENAI_MODEL_VARIANTS.to_vec()
    }
}

// OpenAI API types

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
