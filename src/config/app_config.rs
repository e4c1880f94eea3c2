use std::time::Duration;

use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub cache: CacheSettings,
    pub gateway: GatewaySettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of cache entries before LRU eviction
    pub max_capacity: u64,
    /// Seconds between background sweeps of expired entries
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Default seconds a generated response stays cached
    pub response_ttl_secs: u64,
    /// Seconds a conversation prefers its last successful provider
    pub affinity_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Minimum similarity for a semantic match
    pub default_threshold: f32,
    /// Native search oversampling factor
    pub native_oversample: usize,
    /// In-process scan oversampling factor
    pub fallback_oversample: usize,
    /// Content prefix length for context de-duplication
    pub dedup_prefix_chars: usize,
    /// Vector dimensionality of the embedding store schema
    pub embedding_dimensions: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            sweep_interval_secs: 300,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            response_ttl_secs: 3600,
            affinity_ttl_secs: 1800,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_threshold: 0.7,
            native_oversample: 10,
            fallback_oversample: 3,
            dedup_prefix_chars: 80,
            embedding_dimensions: 1536,
        }
    }
}

impl CacheSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl GatewaySettings {
    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_secs)
    }

    pub fn affinity_ttl(&self) -> Duration {
        Duration::from_secs(self.affinity_ttl_secs)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.cache.max_capacity, 10_000);
        assert_eq!(config.cache.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.gateway.response_ttl(), Duration::from_secs(3600));
        assert_eq!(config.gateway.affinity_ttl(), Duration::from_secs(1800));
        assert!((config.retrieval.default_threshold - 0.7).abs() < 0.001);
        assert_eq!(config.retrieval.native_oversample, 10);
        assert_eq!(config.retrieval.fallback_oversample, 3);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: AppConfig =
            serde_json::from_value(serde_json::json!({"cache": {"max_capacity": 50}})).unwrap();

        assert_eq!(config.cache.max_capacity, 50);
        assert_eq!(config.cache.sweep_interval_secs, 300);
        assert_eq!(config.retrieval.native_oversample, 10);
    }
}
