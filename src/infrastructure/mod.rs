//! Infrastructure layer - concrete backends and orchestration services

pub mod cache;
pub mod context;
pub mod embedding;
pub mod generation;
pub mod logging;
pub mod services;
