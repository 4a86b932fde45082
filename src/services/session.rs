//! Session lifecycle management
//!
//! Sessions are opaque random identifiers pointing at a JSON record in the
//! key-value backend. Three structures exist per user:
//! - `session:{id}` holds the record itself with a sliding TTL
//! - `device_session:{user}:{agent}` points a device at its current session
//! - `user:sessions:{user}` is the set of live ids, backing the per-user cap
//!
//! Validation refreshes the TTL, so a session stays alive as long as it is
//! used and lapses after the configured idle period. Validation fails closed:
//! a backend error means "no session".

use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::keys;
use crate::kv::{DynKvBackend, KvError};
use crate::models::{SessionRecord, UserProfile};

/// Error type for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The user already has the maximum number of live sessions
    #[error("maximum number of active sessions reached")]
    LimitExceeded,

    /// The backend failed
    #[error(transparent)]
    Backend(#[from] KvError),

    /// A session record could not be encoded or decoded
    #[error("session record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Session store backed by the key-value layer.
pub struct SessionStore {
    kv: DynKvBackend,
    ttl: Duration,
    max_active_sessions: u64,
}

impl SessionStore {
    pub fn new(kv: DynKvBackend, config: &SessionConfig) -> Self {
        Self {
            kv,
            ttl: Duration::from_secs(config.ttl_seconds),
            max_active_sessions: config.max_active_sessions,
        }
    }

    /// Create a new session for a user and return its id.
    ///
    /// The cap on concurrent sessions is enforced here; callers wanting the
    /// replace-on-same-device behavior destroy the old device session first.
    ///
    /// # Errors
    ///
    /// - [`SessionError::LimitExceeded`] when the user is at the cap
    /// - [`SessionError::Backend`] when the backend fails
    pub async fn create_session(
        &self,
        user: &UserProfile,
        ip: &str,
        user_agent: &str,
    ) -> Result<String, SessionError> {
        let set_key = keys::user_sessions(&user.id);

        let active = self.kv.scard(&set_key).await?;
        if active >= self.max_active_sessions {
            warn!(
                user_id = %user.id,
                active_sessions = active,
                "Session limit reached, refusing new session"
            );
            return Err(SessionError::LimitExceeded);
        }

        let session_id = Uuid::new_v4().to_string();
        let record = SessionRecord::new(user, ip, user_agent);
        let payload = serde_json::to_string(&record)?;

        self.kv
            .set(&keys::session(&session_id), &payload, Some(self.ttl))
            .await?;
        self.kv
            .set(
                &keys::device_session(&user.id, user_agent),
                &session_id,
                Some(self.ttl),
            )
            .await?;
        self.kv.sadd(&set_key, &session_id).await?;

        info!(
            user_id = %user.id,
            active_sessions = active + 1,
            "Session created"
        );
        Ok(session_id)
    }

    /// Validate a session id, refreshing its TTL on success.
    ///
    /// Returns `None` for unknown, expired, or undecodable sessions, and for
    /// any backend failure.
    pub async fn validate_session(&self, session_id: &str) -> Option<SessionRecord> {
        let key = keys::session(session_id);

        let payload = match self.kv.get(&key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                error!(error = %err, "Backend error during session validation, failing closed");
                return None;
            }
        };

        let mut record: SessionRecord = match serde_json::from_str(&payload) {
            Ok(record) => record,
            Err(err) => {
                error!(error = %err, "Corrupt session record, failing closed");
                return None;
            }
        };

        record.touch();
        let refreshed = match serde_json::to_string(&record) {
            Ok(refreshed) => refreshed,
            Err(err) => {
                error!(error = %err, "Failed to re-encode session record");
                return None;
            }
        };

        // Rewriting the record slides the TTL forward.
        if let Err(err) = self.kv.set(&key, &refreshed, Some(self.ttl)).await {
            error!(error = %err, "Failed to refresh session TTL, failing closed");
            return None;
        }

        Some(record)
    }

    /// Destroy a single session, cleaning up its device pointer and its entry
    /// in the user's session set. Returns false if the session did not exist.
    pub async fn destroy_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let key = keys::session(session_id);

        let payload = match self.kv.get(&key).await? {
            Some(payload) => payload,
            None => return Ok(false),
        };
        let record: SessionRecord = serde_json::from_str(&payload)?;

        self.kv.delete(&key).await?;
        self.kv
            .delete(&keys::device_session(&record.user_id, &record.user_agent))
            .await?;
        self.kv
            .srem(&keys::user_sessions(&record.user_id), session_id)
            .await?;

        info!(user_id = %record.user_id, "Session destroyed");
        Ok(true)
    }

    /// Destroy every live session a user has. Returns how many ids were in
    /// the set.
    pub async fn destroy_all_user_sessions(&self, user_id: &str) -> Result<u64, SessionError> {
        let set_key = keys::user_sessions(user_id);
        let session_ids = self.kv.smembers(&set_key).await?;

        if session_ids.is_empty() {
            self.kv.delete(&set_key).await?;
            return Ok(0);
        }

        let mut to_delete: Vec<String> = session_ids.iter().map(|id| keys::session(id)).collect();
        to_delete.push(set_key);
        self.kv.delete_many(&to_delete).await?;

        info!(
            user_id,
            sessions_destroyed = session_ids.len(),
            "All user sessions destroyed"
        );
        Ok(session_ids.len() as u64)
    }

    /// Number of live sessions in the user's set.
    pub async fn get_active_session_count(&self, user_id: &str) -> Result<u64, SessionError> {
        Ok(self.kv.scard(&keys::user_sessions(user_id)).await?)
    }

    /// The session id currently bound to a (user, device) pair, if any.
    pub async fn device_session_id(
        &self,
        user_id: &str,
        user_agent: &str,
    ) -> Result<Option<String>, SessionError> {
        Ok(self
            .kv
            .get(&keys::device_session(user_id, user_agent))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::test_support::FailingKv;
    use crate::kv::MemoryKv;
    use std::sync::Arc;

    fn test_user() -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            email: "user@example.com".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            avatar_url: None,
            is_admin: false,
            is_verified: true,
            is_active: true,
        }
    }

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryKv::new()), &SessionConfig::default())
    }

    #[tokio::test]
    async fn test_create_and_validate_session() {
        let store = store();
        let user = test_user();

        let session_id = store
            .create_session(&user, "203.0.113.9", "Mozilla/5.0")
            .await
            .unwrap();

        let record = store.validate_session(&session_id).await.unwrap();
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.email, "user@example.com");
        assert_eq!(record.ip, "203.0.113.9");
        assert_eq!(record.user_agent, "Mozilla/5.0");
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let store = store();
        let user = test_user();

        let a = store.create_session(&user, "ip", "agent-a").await.unwrap();
        let b = store.create_session(&user, "ip", "agent-b").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_validate_unknown_session() {
        let store = store();
        assert!(store.validate_session("no-such-session").await.is_none());
    }

    #[tokio::test]
    async fn test_validation_advances_last_activity() {
        let store = store();
        let user = test_user();

        let session_id = store.create_session(&user, "ip", "agent").await.unwrap();
        let first = store.validate_session(&session_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = store.validate_session(&session_id).await.unwrap();

        assert!(second.last_activity >= first.last_activity);
        assert_eq!(second.login_time, first.login_time);
    }

    #[tokio::test]
    async fn test_session_limit_enforced() {
        let store = store();
        let user = test_user();

        for i in 0..5 {
            store
                .create_session(&user, "ip", &format!("agent-{i}"))
                .await
                .unwrap();
        }
        assert_eq!(store.get_active_session_count("u1").await.unwrap(), 5);

        let result = store.create_session(&user, "ip", "agent-6").await;
        assert!(matches!(result, Err(SessionError::LimitExceeded)));
    }

    #[tokio::test]
    async fn test_destroying_a_session_frees_a_slot() {
        let store = store();
        let user = test_user();

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(
                store
                    .create_session(&user, "ip", &format!("agent-{i}"))
                    .await
                    .unwrap(),
            );
        }

        assert!(store.destroy_session(&ids[0]).await.unwrap());
        assert_eq!(store.get_active_session_count("u1").await.unwrap(), 4);

        store.create_session(&user, "ip", "agent-new").await.unwrap();
        assert_eq!(store.get_active_session_count("u1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_destroy_session_cleans_device_pointer() {
        let store = store();
        let user = test_user();

        let session_id = store.create_session(&user, "ip", "agent").await.unwrap();
        assert_eq!(
            store.device_session_id("u1", "agent").await.unwrap(),
            Some(session_id.clone())
        );

        store.destroy_session(&session_id).await.unwrap();
        assert_eq!(store.device_session_id("u1", "agent").await.unwrap(), None);
        assert!(store.validate_session(&session_id).await.is_none());
    }

    #[tokio::test]
    async fn test_destroy_missing_session_is_false() {
        let store = store();
        assert!(!store.destroy_session("no-such-session").await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy_all_user_sessions() {
        let store = store();
        let user = test_user();

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                store
                    .create_session(&user, "ip", &format!("agent-{i}"))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(store.destroy_all_user_sessions("u1").await.unwrap(), 3);
        assert_eq!(store.get_active_session_count("u1").await.unwrap(), 0);
        for id in &ids {
            assert!(store.validate_session(id).await.is_none());
        }

        // Second pass finds nothing.
        assert_eq!(store.destroy_all_user_sessions("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sliding_expiration() {
        let kv = Arc::new(MemoryKv::new());
        let config = SessionConfig {
            ttl_seconds: 1,
            max_active_sessions: 5,
        };
        let store = SessionStore::new(kv, &config);
        let user = test_user();

        let session_id = store.create_session(&user, "ip", "agent").await.unwrap();

        // Keep touching the session; each validation slides the TTL.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(600)).await;
            assert!(store.validate_session(&session_id).await.is_some());
        }

        // Left idle past the TTL, it lapses.
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(store.validate_session(&session_id).await.is_none());
    }

    #[tokio::test]
    async fn test_validation_fails_closed_on_backend_error() {
        let store = SessionStore::new(Arc::new(FailingKv), &SessionConfig::default());
        assert!(store.validate_session("any").await.is_none());
    }

    #[tokio::test]
    async fn test_create_propagates_backend_error() {
        let store = SessionStore::new(Arc::new(FailingKv), &SessionConfig::default());
        let result = store.create_session(&test_user(), "ip", "agent").await;
        assert!(matches!(result, Err(SessionError::Backend(_))));
    }
}
