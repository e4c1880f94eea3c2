//! Typed application configuration

mod app_config;

pub use app_config::{
    AppConfig, CacheSettings, GatewaySettings, LogFormat, LoggingConfig, RetrievalSettings,
};
