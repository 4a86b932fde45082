//! Key-value backend layer
//!
//! This module provides the shared key-value store abstraction every guard
//! component builds on. It supports:
//! - In-memory backend - default, for tests and single-instance deployment
//! - Redis backend - for distributed deployment
//!
//! The backend driver is selected based on configuration. All atomicity the
//! guard layer relies on (increment, set add/remove, cardinality) comes from
//! these primitives; the components themselves never lock.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{KvConfig, KvDriver};

pub use memory::MemoryKv;
pub use redis::RedisKv;

/// Error type for backend operations.
///
/// `Unavailable` covers network and protocol failures; callers decide
/// per-operation whether to fail open or closed on it. `WrongType` means a
/// key already holds a value the requested primitive cannot operate on.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The backend could not be reached or returned a protocol error
    #[error("key-value backend unavailable: {0}")]
    Unavailable(String),

    /// The key holds a value of the wrong kind for this operation
    #[error("wrong value type at key '{0}'")]
    WrongType(String),
}

/// Key-value backend trait
///
/// Object-safe so implementations can be injected as `Arc<dyn KvBackend>`
/// and swapped for the in-memory backend in tests. Values are strings;
/// callers serialize structured data to JSON themselves.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Get a value. Absent and expired keys both return `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Set a value, overwriting any existing one. `ttl` of `None` persists
    /// until explicitly deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Delete a key. Returns false if it was already absent.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Delete several keys in a single batched round trip. Returns the
    /// number of keys that existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64, KvError>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Atomically increment an integer value, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64, KvError>;

    /// Set a TTL on an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Add a member to a set. Returns true if it was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError>;

    /// Remove a member from a set. Returns true if it was present.
    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError>;

    /// All members of a set; empty for an absent key.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError>;

    /// Set cardinality; 0 for an absent key.
    async fn scard(&self, key: &str) -> Result<u64, KvError>;
}

/// Shared handle to a backend implementation.
pub type DynKvBackend = Arc<dyn KvBackend>;

/// Create a backend instance based on configuration.
///
/// # Errors
///
/// - Returns an error if Redis is configured without a URL
/// - Returns an error if the Redis connection cannot be established
pub async fn create_backend(config: &KvConfig) -> anyhow::Result<DynKvBackend> {
    match config.driver {
        KvDriver::Memory => Ok(Arc::new(MemoryKv::new())),
        KvDriver::Redis => {
            let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                anyhow::anyhow!(
                    "Redis URL is required when using the Redis backend. \
                     Set 'redis_url' in the kv configuration or use WARDEN_KV_REDIS_URL."
                )
            })?;
            let backend = RedisKv::connect(redis_url).await?;
            Ok(Arc::new(backend))
        }
    }
}
