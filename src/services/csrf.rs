//! Anti-forgery tokens bound to sessions
//!
//! Each session gets at most one token, stored server-side under the session
//! id with its own TTL. Comparison runs in fixed time over the full length of
//! both strings so a byte-by-byte timing probe learns nothing. Validation
//! fails closed: a backend error rejects the token.

use std::time::Duration;

use argon2::password_hash::rand_core::{OsRng, RngCore};
use data_encoding::HEXLOWER;
use tracing::{error, info, warn};

use crate::config::CsrfConfig;
use crate::keys;
use crate::kv::{DynKvBackend, KvError};

const TOKEN_BYTES: usize = 32;

/// Per-session anti-forgery token guard.
pub struct CsrfGuard {
    kv: DynKvBackend,
    ttl: Duration,
}

impl CsrfGuard {
    pub fn new(kv: DynKvBackend, config: &CsrfConfig) -> Self {
        Self {
            kv,
            ttl: Duration::from_secs(config.ttl_seconds),
        }
    }

    /// Generate a fresh token for a session, replacing any existing one.
    pub async fn generate_token(&self, session_id: &str) -> Result<String, KvError> {
        let token = random_token();
        self.kv
            .set(&keys::csrf(session_id), &token, Some(self.ttl))
            .await?;
        info!(session_id, "Anti-forgery token issued");
        Ok(token)
    }

    /// Check a candidate token against the stored one.
    ///
    /// Unknown sessions, expired tokens, and backend errors all reject.
    pub async fn validate_token(&self, session_id: &str, candidate: &str) -> bool {
        let stored = match self.kv.get(&keys::csrf(session_id)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                warn!(session_id, "No anti-forgery token for session");
                return false;
            }
            Err(err) => {
                error!(
                    session_id,
                    error = %err,
                    "Backend error during token validation, failing closed"
                );
                return false;
            }
        };

        let valid = fixed_time_eq(stored.as_bytes(), candidate.as_bytes());
        if !valid {
            warn!(session_id, "Anti-forgery token mismatch");
        }
        valid
    }

    /// Rotate the token: drop the old one and issue a replacement.
    pub async fn refresh_token(&self, session_id: &str) -> Result<String, KvError> {
        self.kv.delete(&keys::csrf(session_id)).await?;
        self.generate_token(session_id).await
    }

    /// Remove the token, for example when the session ends.
    pub async fn delete_token(&self, session_id: &str) -> Result<(), KvError> {
        self.kv.delete(&keys::csrf(session_id)).await?;
        Ok(())
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}

/// Compare two byte strings without short-circuiting.
///
/// Every byte of both inputs is folded into the accumulator, so the running
/// time depends only on the lengths, not on where they first differ.
fn fixed_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::test_support::FailingKv;
    use crate::kv::KvBackend;
    use crate::kv::MemoryKv;
    use std::sync::Arc;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(Arc::new(MemoryKv::new()), &CsrfConfig::default())
    }

    #[tokio::test]
    async fn test_generate_and_validate() {
        let guard = guard();

        let token = guard.generate_token("sid-1").await.unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(guard.validate_token("sid-1", &token).await);
        assert!(!guard.validate_token("sid-1", "0000").await);
    }

    #[tokio::test]
    async fn test_tokens_are_per_session() {
        let guard = guard();

        let token_a = guard.generate_token("sid-a").await.unwrap();
        let token_b = guard.generate_token("sid-b").await.unwrap();
        assert_ne!(token_a, token_b);
        assert!(!guard.validate_token("sid-a", &token_b).await);
        assert!(!guard.validate_token("sid-b", &token_a).await);
    }

    #[tokio::test]
    async fn test_refresh_invalidates_old_token() {
        let guard = guard();

        let old = guard.generate_token("sid-1").await.unwrap();
        let new = guard.refresh_token("sid-1").await.unwrap();

        assert_ne!(old, new);
        assert!(!guard.validate_token("sid-1", &old).await);
        assert!(guard.validate_token("sid-1", &new).await);
    }

    #[tokio::test]
    async fn test_delete_token_rejects_afterwards() {
        let guard = guard();

        let token = guard.generate_token("sid-1").await.unwrap();
        guard.delete_token("sid-1").await.unwrap();
        assert!(!guard.validate_token("sid-1", &token).await);
    }

    #[tokio::test]
    async fn test_unknown_session_rejects() {
        let guard = guard();
        assert!(!guard.validate_token("never-issued", "anything").await);
    }

    #[tokio::test]
    async fn test_token_expires() {
        let kv = Arc::new(MemoryKv::new());
        let config = CsrfConfig { ttl_seconds: 1 };
        let guard = CsrfGuard::new(kv.clone(), &config);

        let token = guard.generate_token("sid-1").await.unwrap();
        kv.expire("csrf:sid-1", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!guard.validate_token("sid-1", &token).await);
    }

    #[tokio::test]
    async fn test_validation_fails_closed_on_backend_error() {
        let guard = CsrfGuard::new(Arc::new(FailingKv), &CsrfConfig::default());
        assert!(!guard.validate_token("sid-1", "token").await);
    }

    #[tokio::test]
    async fn test_generate_propagates_backend_error() {
        let guard = CsrfGuard::new(Arc::new(FailingKv), &CsrfConfig::default());
        assert!(guard.generate_token("sid-1").await.is_err());
    }

    #[test]
    fn test_fixed_time_eq() {
        assert!(fixed_time_eq(b"abc", b"abc"));
        assert!(!fixed_time_eq(b"abc", b"abd"));
        assert!(!fixed_time_eq(b"abc", b"abcd"));
        assert!(fixed_time_eq(b"", b""));
    }
}
