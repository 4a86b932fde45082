//! In-memory backend implementation
//!
//! Provides a process-local backend with Redis-compatible semantics:
//! per-key TTL, atomic increment on string-encoded integers, and sets with
//! add/remove/cardinality. Used in tests and single-instance deployments.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{KvBackend, KvError};

/// Stored value kinds, mirroring the backend types the guards use.
#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-memory key-value backend.
///
/// Expired entries are dropped lazily on access, the same way a remote
/// backend makes them invisible; nothing sweeps in the background.
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for MemoryKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKv").finish_non_exhaustive()
    }
}

impl MemoryKv {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove the entry if its TTL has lapsed, making expiry look atomic.
fn prune(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.write().await;
        prune(&mut entries, key, Instant::now());
        match entries.get(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(KvError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.write().await;
        prune(&mut entries, key, Instant::now());
        Ok(entries.remove(key).is_some())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, KvError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let mut deleted = 0;
        for key in keys {
            prune(&mut entries, key, now);
            if entries.remove(key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.write().await;
        prune(&mut entries, key, Instant::now());
        Ok(entries.contains_key(key))
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut entries = self.entries.write().await;
        prune(&mut entries, key, Instant::now());
        match entries.get_mut(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => {
                let current: i64 = s
                    .parse()
                    .map_err(|_| KvError::WrongType(key.to_string()))?;
                let next = current + 1;
                *s = next.to_string();
                Ok(next)
            }
            Some(_) => Err(KvError::WrongType(key.to_string())),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Str("1".to_string()),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        prune(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.write().await;
        prune(&mut entries, key, Instant::now());
        match entries.get_mut(key) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.insert(member.to_string())),
            Some(_) => Err(KvError::WrongType(key.to_string())),
            None => {
                let mut set = HashSet::new();
                set.insert(member.to_string());
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Set(set),
                        expires_at: None,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.write().await;
        prune(&mut entries, key, Instant::now());
        match entries.get_mut(key) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => {
                let removed = set.remove(member);
                // Redis drops empty sets entirely.
                if set.is_empty() {
                    entries.remove(key);
                }
                Ok(removed)
            }
            Some(_) => Err(KvError::WrongType(key.to_string())),
            None => Ok(false),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut entries = self.entries.write().await;
        prune(&mut entries, key, Instant::now());
        match entries.get(key) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(KvError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn scard(&self, key: &str) -> Result<u64, KvError> {
        let mut entries = self.entries.write().await;
        prune(&mut entries, key, Instant::now());
        match entries.get(key) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.len() as u64),
            Some(_) => Err(KvError::WrongType(key.to_string())),
            None => Ok(0),
        }
    }
}
