//! Cache domain traits and key generation

mod key;
mod repository;

pub use key::{ResponseKeyGenerator, affinity_key};
pub use repository::{Cache, CacheExt, glob_to_regex};

#[cfg(test)]
pub use repository::mock::MockCache;
