//! Redis backend implementation
//!
//! Provides the shared, network-accessible backend for multi-instance
//! deployments.
//!
//! # Features
//! - Per-key TTL via SETEX/EXPIRE
//! - Atomic counters via INCR
//! - Session-id sets via SADD/SREM/SMEMBERS/SCARD
//! - Batched multi-key deletion via a single pipeline round trip

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ErrorKind};
use std::time::Duration;

use super::{KvBackend, KvError};

/// Redis key-value backend.
///
/// Holds a multiplexed connection; clones of it share one TCP stream, so a
/// single backend instance serves any number of concurrent request tasks.
pub struct RedisKv {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKv").finish_non_exhaustive()
    }
}

impl RedisKv {
    /// Connect to Redis at the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self { connection })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

/// Translate a Redis error, keeping WRONGTYPE distinct from unavailability.
fn map_err(key: &str, err: redis::RedisError) -> KvError {
    if err.kind() == ErrorKind::TypeError || err.code() == Some("WRONGTYPE") {
        KvError::WrongType(key.to_string())
    } else {
        KvError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl KvBackend for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await.map_err(|e| map_err(key, e))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut conn = self.conn();
        match ttl {
            // SETEX: value and expiry land atomically; TTL below 1s rounds up.
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                let _: () = conn
                    .set_ex(key, value, secs)
                    .await
                    .map_err(|e| map_err(key, e))?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(|e| map_err(key, e))?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn();
        let deleted: i64 = conn.del(key).await.map_err(|e| map_err(key, e))?;
        Ok(deleted > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, KvError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.del(key);
        }
        let counts: Vec<i64> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err(&keys[0], e))?;
        Ok(counts.into_iter().filter(|&n| n > 0).count() as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(key).await.map_err(|e| map_err(key, e))?;
        Ok(exists)
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.conn();
        let value: i64 = conn.incr(key, 1).await.map_err(|e| map_err(key, e))?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn();
        let secs = ttl.as_secs().max(1) as i64;
        let set: bool = conn.expire(key, secs).await.map_err(|e| map_err(key, e))?;
        Ok(set)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut conn = self.conn();
        let added: i64 = conn.sadd(key, member).await.map_err(|e| map_err(key, e))?;
        Ok(added == 1)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut conn = self.conn();
        let removed: i64 = conn.srem(key, member).await.map_err(|e| map_err(key, e))?;
        Ok(removed == 1)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).await.map_err(|e| map_err(key, e))?;
        Ok(members)
    }

    async fn scard(&self, key: &str) -> Result<u64, KvError> {
        let mut conn = self.conn();
        let count: u64 = conn.scard(key).await.map_err(|e| map_err(key, e))?;
        Ok(count)
    }
}
