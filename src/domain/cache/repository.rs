//! Cache trait definition

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::domain::DomainError;

/// Generic expiring key/value cache shared by the gateway and retrieval
/// services.
///
/// The trait stores raw JSON strings to stay dyn-compatible; use the
/// [`CacheExt`] helpers for typed get/set operations. An entry is logically
/// absent once its TTL has elapsed, even if it has not been swept yet.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Gets a raw JSON value, removing it if it has expired.
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Stores a raw JSON value, resetting the expiry to now + ttl.
    /// Overwrites any prior value and TTL for the key.
    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    /// Deletes a single key, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Deletes every key matching a glob pattern (`*` is the wildcard).
    /// A pattern of `"*"` clears the whole cache. Returns the number of
    /// keys removed.
    async fn invalidate(&self, pattern: &str) -> Result<usize, DomainError>;

    /// Removes entries whose expiry has passed. Called by the periodic
    /// sweeper so memory stays bounded even without reads.
    async fn purge_expired(&self) -> Result<usize, DomainError>;

    /// Clears all entries.
    async fn clear(&self) -> Result<(), DomainError>;

    /// Current entry count, for observability.
    async fn size(&self) -> Result<usize, DomainError>;
}

/// Extension trait providing typed get/set operations
pub trait CacheExt: Cache {
    /// Gets a typed value from the cache
    fn get<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.get_raw(key).await? {
                Some(data) => {
                    let value: V = serde_json::from_str(&data).map_err(|e| {
                        DomainError::cache(format!("Failed to deserialize cache value: {}", e))
                    })?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }
    }

    /// Sets a typed value in the cache with a TTL
    fn set<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::cache(format!("Failed to serialize cache value: {}", e))
            })?;
            self.set_raw(key, &data, ttl).await
        }
    }
}

// Blanket implementation for all types implementing Cache
impl<T: Cache + ?Sized> CacheExt for T {}

/// Translates a glob pattern (with `*` wildcards) into an anchored regex
/// matching the whole key.
pub fn glob_to_regex(pattern: &str) -> Result<regex::Regex, DomainError> {
    let escaped = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    regex::Regex::new(&format!("^{}$", escaped))
        .map_err(|e| DomainError::cache(format!("Invalid pattern: {}", e)))
}
