//! Orchestration services wiring providers, stores and the cache

mod context_service;
mod embedding_service;
mod provider_gateway;

pub use context_service::{
    ContextService, RelevantContextParams, RetrievalConfig, SimilarContextParams, StoreOutcome,
};
pub use embedding_service::EmbeddingGenerator;
pub use provider_gateway::{GatewayConfig, ProviderGateway};
