//! Cache key generation

use sha2::{Digest, Sha256};

/// Generates deterministic, namespaced cache keys for generated responses.
///
/// Keys are derived from a sha-256 digest of the prompt text so the same
/// prompt maps to the same key across processes and restarts.
#[derive(Debug, Clone)]
pub struct ResponseKeyGenerator {
    namespace: String,
}

impl ResponseKeyGenerator {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Returns the cache key for a prompt.
    pub fn key_for_prompt(&self, prompt: &str) -> String {
        let digest = Sha256::digest(prompt.as_bytes());
        format!("{}:{}", self.namespace, hex::encode(&digest[..16]))
    }

    /// Returns the glob pattern matching every key in this namespace.
    pub fn namespace_pattern(&self) -> String {
        format!("{}:*", self.namespace)
    }
}

/// Builds the cache key holding the last-successful provider for a
/// conversation.
pub fn affinity_key(namespace: &str, conversation_id: &str) -> String {
    format!("{}:{}", namespace, conversation_id)
}
