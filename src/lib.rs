//! Scribe AI core
//!
//! The AI orchestration and semantic-context-retrieval subsystem:
//! - generated text from a prompt via interchangeable backends with
//!   ordered fallback, response caching and per-conversation affinity
//! - text to fixed-dimension embeddings with the same fallback philosophy
//! - per-message embedding storage with semantic search, degrading from a
//!   database-native vector index to an in-process similarity scan
//! - the generic in-process expiring cache these pieces share
//!
//! The crate is consumed as a library; it owns no network or command-line
//! surface.

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use tracing::info;

use domain::{Cache, EmbeddingStore, GenerationProvider};
use infrastructure::cache::{CacheSweeper, InMemoryCache, InMemoryCacheConfig};
use infrastructure::context::{InMemoryMessageStore, PgVectorMessageStore, PgVectorStoreConfig};
use infrastructure::embedding::{OpenAiEmbeddingBackend, VoyageEmbeddingBackend};
use infrastructure::generation::{AnthropicProvider, HttpClient, OpenAiProvider};
use infrastructure::services::{
    ContextService, EmbeddingGenerator, GatewayConfig, ProviderGateway, RetrievalConfig,
};

const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// The assembled core: one shared cache (with its sweeper), the provider
/// gateway, the embedding generator and the context service.
#[derive(Debug)]
pub struct Engine {
    pub gateway: Arc<ProviderGateway>,
    pub context: Arc<ContextService>,
    pub embeddings: Arc<EmbeddingGenerator>,
    pub cache: Arc<dyn Cache>,
    sweeper: CacheSweeper,
}

impl Engine {
    /// Stops the cache sweeper. Call at process shutdown so the interval
    /// timer is not leaked.
    pub async fn shutdown(self) {
        self.sweeper.stop().await;
    }
}

/// Builds the engine from configuration and environment.
///
/// Provider credentials come from `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`
/// and `VOYAGE_API_KEY`; backends without credentials stay wired in but
/// report unavailable and are skipped by fallback chains. The embedding
/// store uses PostgreSQL + pgvector when `DATABASE_URL` is set and an
/// in-memory store otherwise.
pub async fn build_engine(config: &AppConfig) -> anyhow::Result<Engine> {
    let _ = dotenvy::dotenv();

    let http = HttpClient::with_timeout(HTTP_TIMEOUT)?;

    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::with_config(
        InMemoryCacheConfig::default().with_max_capacity(config.cache.max_capacity),
    ));
    let sweeper = CacheSweeper::start(cache.clone(), config.cache.sweep_interval());

    let providers: Vec<Arc<dyn GenerationProvider>> = vec![
        Arc::new(OpenAiProvider::new(
            http.clone(),
            std::env::var("OPENAI_API_KEY").ok(),
        )),
        Arc::new(AnthropicProvider::new(
            http.clone(),
            std::env::var("ANTHROPIC_API_KEY").ok(),
        )),
    ];

    let gateway_config = GatewayConfig::default()
        .with_response_ttl(config.gateway.response_ttl())
        .with_affinity_ttl(config.gateway.affinity_ttl());
    let gateway = Arc::new(ProviderGateway::with_config(
        providers,
        cache.clone(),
        gateway_config,
    ));

    let embeddings = Arc::new(EmbeddingGenerator::new(
        Arc::new(OpenAiEmbeddingBackend::new(
            http.clone(),
            std::env::var("OPENAI_API_KEY").ok(),
        )),
        Some(Arc::new(VoyageEmbeddingBackend::new(
            http,
            std::env::var("VOYAGE_API_KEY").ok(),
        ))),
    ));

    let store: Arc<dyn EmbeddingStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            info!("Connecting to PostgreSQL for the embedding store...");
            let pool = sqlx::PgPool::connect(&url).await?;
            let store = PgVectorMessageStore::new(
                pool,
                PgVectorStoreConfig::new(config.retrieval.embedding_dimensions),
            );
            store.ensure_schema().await?;
            info!("Embedding store schema ready");
            Arc::new(store)
        }
        Err(_) => {
            info!("DATABASE_URL not set; using the in-memory embedding store");
            Arc::new(InMemoryMessageStore::new())
        }
    };

    let retrieval_config = RetrievalConfig {
        default_threshold: config.retrieval.default_threshold,
        native_oversample: config.retrieval.native_oversample,
        fallback_oversample: config.retrieval.fallback_oversample,
        dedup_prefix_chars: config.retrieval.dedup_prefix_chars,
    };
    let context = Arc::new(ContextService::with_config(
        store,
        embeddings.clone(),
        retrieval_config,
    ));

    Ok(Engine {
        gateway,
        context,
        embeddings,
        cache,
        sweeper,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_engine_without_external_services() {
        // No DATABASE_URL and no API keys: the engine still assembles,
        // with unconfigured providers and the in-memory store.
        let engine = build_engine(&AppConfig::default()).await.unwrap();

        let report = engine.gateway.health_check().await;
        assert_eq!(report.len(), 2);

        engine.shutdown().await;
    }
}
