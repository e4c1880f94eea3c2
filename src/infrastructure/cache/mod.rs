//! Cache infrastructure

mod in_memory;
mod sweeper;

pub use in_memory::{InMemoryCache, InMemoryCacheConfig};
pub use sweeper::CacheSweeper;
