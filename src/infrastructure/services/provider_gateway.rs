//! Provider gateway: ordered fallback, response caching, conversation
//! affinity

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::cache::{Cache, CacheExt, ResponseKeyGenerator, affinity_key};
use crate::domain::{DomainError, GenerationProvider, GenerationRequest, GenerationResponse};

/// Configuration for the provider gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Namespace prefix for cached responses
    pub response_namespace: String,
    /// TTL applied when a request carries none
    pub default_response_ttl: Duration,
    /// Namespace prefix for conversation affinity entries
    pub affinity_namespace: String,
    /// How long a conversation prefers its last successful provider;
    /// refreshed on every success.
    pub affinity_ttl: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            response_namespace: "gen".to_string(),
            default_response_ttl: Duration::from_secs(3600),
            affinity_namespace: "affinity".to_string(),
            affinity_ttl: Duration::from_secs(1800),
        }
    }
}

impl GatewayConfig {
    pub fn with_response_ttl(mut self, ttl: Duration) -> Self {
        self.default_response_ttl = ttl;
        self
    }

    pub fn with_affinity_ttl(mut self, ttl: Duration) -> Self {
        self.affinity_ttl = ttl;
        self
    }
}

/// Produces generated text via interchangeable backends with ordered
/// fallback and response caching.
///
/// Cache faults are absorbed and logged; caching is a performance
/// optimization, never a correctness dependency. Only validation errors
/// and total backend exhaustion reach callers.
#[derive(Debug)]
pub struct ProviderGateway {
    providers: Vec<Arc<dyn GenerationProvider>>,
    cache: Arc<dyn Cache>,
    config: GatewayConfig,
    keys: ResponseKeyGenerator,
}

impl ProviderGateway {
    /// Creates a gateway over providers in priority order (primary first).
    pub fn new(providers: Vec<Arc<dyn GenerationProvider>>, cache: Arc<dyn Cache>) -> Self {
        Self::with_config(providers, cache, GatewayConfig::default())
    }

    pub fn with_config(
        providers: Vec<Arc<dyn GenerationProvider>>,
        cache: Arc<dyn Cache>,
        config: GatewayConfig,
    ) -> Self {
        let keys = ResponseKeyGenerator::new(config.response_namespace.clone());

        Self {
            providers,
            cache,
            config,
            keys,
        }
    }

    /// The cache key a request's response is stored under.
    pub fn response_cache_key(&self, request: &GenerationRequest) -> String {
        self.keys.key_for_prompt(&request.prompt)
    }

    /// Generates text for the request, consulting the response cache
    /// first and falling back across providers in priority order.
    pub async fn generate_content(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, DomainError> {
        let key = self.response_cache_key(request);

        if let Some(cached) = self.cached_response(&key).await {
            debug!(key = %key, "Returning cached generation");
            return Ok(cached);
        }

        let mut last_error = None;

        for provider in &self.providers {
            match provider.generate(request).await {
                Ok(response) => {
                    self.store_response(&key, &response, request).await;
                    return Ok(response);
                }
                Err(error) => {
                    warn!(
                        provider = provider.name(),
                        error_kind = error.kind(),
                        error = %error,
                        "Generation backend failed; trying next"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DomainError::configuration("No generation providers configured")))
    }

    /// Conversation-scoped generation: prefers the provider that last
    /// served this conversation, switching to the alternate (and
    /// persisting the switch) on failure, with exactly one retry.
    pub async fn generate_for_conversation(
        &self,
        conversation_id: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, DomainError> {
        let key = self.response_cache_key(request);

        if let Some(cached) = self.cached_response(&key).await {
            debug!(key = %key, conversation_id, "Returning cached generation");
            return Ok(cached);
        }

        let Some(first) = self.resolve_preferred(conversation_id).await else {
            return Err(DomainError::configuration(
                "No generation providers configured",
            ));
        };

        match first.generate(request).await {
            Ok(response) => {
                self.save_affinity(conversation_id, first.name()).await;
                self.store_response(&key, &response, request).await;
                Ok(response)
            }
            Err(first_error) => {
                warn!(
                    provider = first.name(),
                    conversation_id,
                    error_kind = first_error.kind(),
                    error = %first_error,
                    "Preferred backend failed; switching to alternate"
                );

                let Some(alternate) = self
                    .providers
                    .iter()
                    .find(|p| p.name() != first.name())
                    .cloned()
                else {
                    return Err(first_error);
                };

                // Persist the switch before the retry so the next turn
                // starts from the alternate even if this one fails late.
                self.save_affinity(conversation_id, alternate.name()).await;

                match alternate.generate(request).await {
                    Ok(response) => {
                        self.save_affinity(conversation_id, alternate.name()).await;
                        self.store_response(&key, &response, request).await;
                        Ok(response)
                    }
                    Err(second_error) => Err(second_error),
                }
            }
        }
    }

    /// Probes each backend with a minimal request; never errors. An
    /// unreachable or unconfigured backend simply reports unavailable.
    pub async fn health_check(&self) -> HashMap<String, bool> {
        let probe = GenerationRequest::new("ping").with_max_tokens(1);

        let checks = self.providers.iter().map(|provider| {
            let provider = provider.clone();
            let probe = probe.clone();
            async move {
                let available = provider.generate(&probe).await.is_ok();
                (provider.name().to_string(), available)
            }
        });

        join_all(checks).await.into_iter().collect()
    }

    /// The provider the conversation should try first: its remembered
    /// affinity when present, the primary otherwise.
    async fn resolve_preferred(&self, conversation_id: &str) -> Option<Arc<dyn GenerationProvider>> {
        let remembered = self.load_affinity(conversation_id).await;

        remembered
            .as_deref()
            .and_then(|name| self.providers.iter().find(|p| p.name() == name))
            .or_else(|| self.providers.first())
            .cloned()
    }

    async fn cached_response(&self, key: &str) -> Option<GenerationResponse> {
        match self.cache.get::<GenerationResponse>(key).await {
            Ok(hit) => hit,
            Err(error) => {
                warn!(error = %error, "Cache read failed; treating as miss");
                None
            }
        }
    }

    async fn store_response(
        &self,
        key: &str,
        response: &GenerationResponse,
        request: &GenerationRequest,
    ) {
        let ttl = request
            .cache_ttl()
            .unwrap_or(self.config.default_response_ttl);

        if let Err(error) = self.cache.set(key, response, ttl).await {
            warn!(error = %error, "Failed to cache generation response");
        }
    }

    async fn load_affinity(&self, conversation_id: &str) -> Option<String> {
        let key = affinity_key(&self.config.affinity_namespace, conversation_id);

        match self.cache.get::<String>(&key).await {
            Ok(provider) => provider,
            Err(error) => {
                warn!(error = %error, conversation_id, "Affinity read failed; using default order");
                None
            }
        }
    }

    async fn save_affinity(&self, conversation_id: &str, provider: &str) {
        let key = affinity_key(&self.config.affinity_namespace, conversation_id);
        let value = provider.to_string();

        if let Err(error) = self
            .cache
            .set(&key, &value, self.config.affinity_ttl)
            .await
        {
            warn!(error = %error, conversation_id, "Failed to persist provider affinity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::MockCache;
    use crate::domain::generation::MockGenerationProvider;

    fn gateway_with(
        providers: Vec<Arc<dyn GenerationProvider>>,
    ) -> (ProviderGateway, Arc<MockCache>) {
        let cache = Arc::new(MockCache::new());
        let gateway = ProviderGateway::new(providers, cache.clone());
        (gateway, cache)
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_to_secondary() {
        let primary = Arc::new(MockGenerationProvider::new("openai").with_error("timeout"));
        let secondary = Arc::new(MockGenerationProvider::new("anthropic").with_text("from backup"));
        let (gateway, cache) = gateway_with(vec![primary.clone(), secondary.clone()]);

        let request = GenerationRequest::new("draft an intro");
        let response = gateway.generate_content(&request).await.unwrap();

        assert_eq!(response.text, "from backup");
        assert_eq!(response.provider, "anthropic");

        // The secondary's result is now cached under the prompt's key.
        let key = gateway.response_cache_key(&request);
        let cached: Option<GenerationResponse> = cache.get(&key).await.unwrap();
        assert_eq!(cached.unwrap().text, "from backup");
    }

    #[tokio::test]
    async fn test_cache_hit_invokes_no_backend() {
        let primary = Arc::new(MockGenerationProvider::new("openai").with_text("fresh"));
        let (gateway, cache) = gateway_with(vec![primary.clone()]);

        let request = GenerationRequest::new("cached prompt");
        let key = gateway.response_cache_key(&request);
        let canned = GenerationResponse::new("openai", "gpt-4o", "from cache");
        cache.set(&key, &canned, Duration::from_secs(60)).await.unwrap();

        let response = gateway.generate_content(&request).await.unwrap();

        assert_eq!(response.text, "from cache");
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_backends_exhausted_propagates_and_caches_nothing() {
        let primary = Arc::new(MockGenerationProvider::new("openai").with_error("quota"));
        let secondary = Arc::new(MockGenerationProvider::new("anthropic").with_error("overloaded"));
        let (gateway, cache) = gateway_with(vec![primary, secondary]);

        let request = GenerationRequest::new("doomed prompt");
        let error = gateway.generate_content(&request).await.unwrap_err();

        assert!(error.to_string().contains("overloaded"));
        assert_eq!(cache.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_fault_degrades_to_backend_call() {
        let primary = Arc::new(MockGenerationProvider::new("openai").with_text("still works"));
        let cache = Arc::new(MockCache::new().with_error("cache down"));
        let gateway = ProviderGateway::new(vec![primary.clone()], cache);

        let response = gateway
            .generate_content(&GenerationRequest::new("hello"))
            .await
            .unwrap();

        assert_eq!(response.text, "still works");
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_conversation_switch_persists_affinity() {
        let primary = Arc::new(MockGenerationProvider::new("openai").with_error("down"));
        let secondary = Arc::new(MockGenerationProvider::new("anthropic").with_text("rescued"));
        let (gateway, _cache) = gateway_with(vec![primary.clone(), secondary.clone()]);

        let request = GenerationRequest::new("first turn");
        let response = gateway
            .generate_for_conversation("conv-1", &request)
            .await
            .unwrap();

        assert_eq!(response.provider, "anthropic");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);

        // The next turn for the same conversation goes straight to the
        // remembered provider; the primary is not retried.
        let follow_up = GenerationRequest::new("second turn");
        let response = gateway
            .generate_for_conversation("conv-1", &follow_up)
            .await
            .unwrap();

        assert_eq!(response.provider, "anthropic");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 2);
    }

    #[tokio::test]
    async fn test_conversation_without_affinity_uses_primary() {
        let primary = Arc::new(MockGenerationProvider::new("openai").with_text("primary answer"));
        let secondary = Arc::new(MockGenerationProvider::new("anthropic").with_text("unused"));
        let (gateway, _cache) = gateway_with(vec![primary.clone(), secondary.clone()]);

        let response = gateway
            .generate_for_conversation("fresh-conv", &GenerationRequest::new("hello"))
            .await
            .unwrap();

        assert_eq!(response.provider, "openai");
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_conversation_both_backends_failing_surfaces_error() {
        let primary = Arc::new(MockGenerationProvider::new("openai").with_error("down"));
        let secondary = Arc::new(MockGenerationProvider::new("anthropic").with_error("also down"));
        let (gateway, _cache) = gateway_with(vec![primary.clone(), secondary.clone()]);

        let error = gateway
            .generate_for_conversation("conv-1", &GenerationRequest::new("hello"))
            .await
            .unwrap_err();

        assert!(error.to_string().contains("also down"));
        // Exactly one retry: each backend was attempted once.
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_health_check_reports_per_backend_availability() {
        let healthy = Arc::new(MockGenerationProvider::new("openai").with_text("pong"));
        let unconfigured = Arc::new(MockGenerationProvider::new("anthropic").unconfigured());
        let (gateway, _cache) = gateway_with(vec![healthy, unconfigured]);

        let report = gateway.health_check().await;

        assert_eq!(report.get("openai"), Some(&true));
        assert_eq!(report.get("anthropic"), Some(&false));
    }

    #[tokio::test]
    async fn test_no_providers_is_a_configuration_error() {
        let (gateway, _cache) = gateway_with(vec![]);

        let error = gateway
            .generate_content(&GenerationRequest::new("hello"))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), "configuration");
    }
}
