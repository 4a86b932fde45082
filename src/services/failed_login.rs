//! Failed-login tracking and lockouts
//!
//! One `BruteForceGuard` watches one identifier space (client IP, device
//! fingerprint, or email). Failures inside a rolling window are counted with
//! an atomic increment; once the count exceeds the configured maximum a
//! lockout sentinel is written and the identifier is blocked until it lapses.
//!
//! Lock checks fail open: if the backend is unreachable the guard reports
//! "not blocked" and logs the error, so an outage degrades protection rather
//! than locking every user out.

use std::time::Duration;

use tracing::{error, warn};

use crate::config::LoginAttemptConfig;
use crate::keys;
use crate::kv::{DynKvBackend, KvError};

/// The kinds of identifiers tracked independently of each other.
///
/// Each space has its own key namespace, so the same raw string (say an
/// email used as both login and support contact) never shares a counter
/// across spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierSpace {
    /// Client IP address
    Ip,
    /// Device fingerprint (user agent)
    Device,
    /// Account email
    Email,
}

impl IdentifierSpace {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Device => "device",
            Self::Email => "email",
        }
    }
}

/// Failure counter and lockout for one identifier space.
pub struct BruteForceGuard {
    kv: DynKvBackend,
    space: IdentifierSpace,
    max_attempts: i64,
    attempt_window: Duration,
    lock_duration: Duration,
}

impl BruteForceGuard {
    pub fn new(kv: DynKvBackend, space: IdentifierSpace, config: &LoginAttemptConfig) -> Self {
        Self {
            kv,
            space,
            max_attempts: config.max_attempts,
            attempt_window: Duration::from_secs(config.attempt_window_seconds),
            lock_duration: Duration::from_secs(config.lock_duration_seconds),
        }
    }

    /// Record one failed attempt and lock the identifier once the count
    /// exceeds the maximum. Returns the count after this attempt.
    ///
    /// The counter's window starts at its first increment; later failures
    /// inside the window do not extend it.
    pub async fn record_failed_attempt(&self, identifier: &str) -> Result<i64, KvError> {
        let counter_key = keys::failed_attempts(self.space, identifier);
        let attempts = self.kv.incr(&counter_key).await?;
        if attempts == 1 {
            self.kv.expire(&counter_key, self.attempt_window).await?;
        }

        if attempts > self.max_attempts {
            self.lock(identifier).await?;
            warn!(
                space = self.space.as_str(),
                identifier,
                attempts,
                "Too many failed attempts, identifier locked"
            );
        }

        Ok(attempts)
    }

    /// Whether the identifier is currently locked out.
    ///
    /// Backend errors are logged and treated as "not blocked".
    pub async fn is_blocked(&self, identifier: &str) -> bool {
        match self.kv.exists(&keys::lock(self.space, identifier)).await {
            Ok(blocked) => blocked,
            Err(err) => {
                error!(
                    space = self.space.as_str(),
                    identifier,
                    error = %err,
                    "Backend error during lock check, failing open"
                );
                false
            }
        }
    }

    /// Lock the identifier immediately, without going through the counter.
    pub async fn lock(&self, identifier: &str) -> Result<(), KvError> {
        self.kv
            .set(
                &keys::lock(self.space, identifier),
                "1",
                Some(self.lock_duration),
            )
            .await
    }

    /// Drop both the lockout and the failure counter, for example after a
    /// successful login.
    pub async fn clear_attempts(&self, identifier: &str) -> Result<(), KvError> {
        self.kv.delete(&keys::lock(self.space, identifier)).await?;
        self.kv
            .delete(&keys::failed_attempts(self.space, identifier))
            .await?;
        Ok(())
    }

    /// Failures still tolerated before the next one triggers a lockout.
    pub async fn remaining_attempts(&self, identifier: &str) -> Result<i64, KvError> {
        let counter_key = keys::failed_attempts(self.space, identifier);
        let attempts = match self.kv.get(&counter_key).await? {
            Some(value) => value.parse::<i64>().unwrap_or(0),
            None => 0,
        };
        Ok((self.max_attempts - attempts).max(0))
    }
}

/// The three guards a login flow consults, one per identifier space.
pub struct BruteForceGuards {
    pub ip: BruteForceGuard,
    pub device: BruteForceGuard,
    pub email: BruteForceGuard,
}

impl BruteForceGuards {
    pub fn new(kv: DynKvBackend, config: &LoginAttemptConfig) -> Self {
        Self {
            ip: BruteForceGuard::new(kv.clone(), IdentifierSpace::Ip, config),
            device: BruteForceGuard::new(kv.clone(), IdentifierSpace::Device, config),
            email: BruteForceGuard::new(kv, IdentifierSpace::Email, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::test_support::FailingKv;
    use crate::kv::KvBackend;
    use crate::kv::MemoryKv;
    use std::sync::Arc;

    fn test_config() -> LoginAttemptConfig {
        LoginAttemptConfig {
            attempt_window_seconds: 3600,
            max_attempts: 5,
            lock_duration_seconds: 1800,
        }
    }

    fn guard(space: IdentifierSpace) -> BruteForceGuard {
        BruteForceGuard::new(Arc::new(MemoryKv::new()), space, &test_config())
    }

    #[tokio::test]
    async fn test_lock_triggers_only_after_exceeding_max() {
        let guard = guard(IdentifierSpace::Ip);

        // Exactly max_attempts failures leave the identifier unblocked.
        for expected in 1..=5 {
            let attempts = guard.record_failed_attempt("203.0.113.9").await.unwrap();
            assert_eq!(attempts, expected);
            assert!(!guard.is_blocked("203.0.113.9").await);
        }

        // One more crosses the threshold.
        assert_eq!(guard.record_failed_attempt("203.0.113.9").await.unwrap(), 6);
        assert!(guard.is_blocked("203.0.113.9").await);
    }

    #[tokio::test]
    async fn test_clear_attempts_unblocks() {
        let guard = guard(IdentifierSpace::Email);

        for _ in 0..6 {
            guard.record_failed_attempt("a@example.com").await.unwrap();
        }
        assert!(guard.is_blocked("a@example.com").await);

        guard.clear_attempts("a@example.com").await.unwrap();
        assert!(!guard.is_blocked("a@example.com").await);
        assert_eq!(guard.remaining_attempts("a@example.com").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_explicit_lock() {
        let guard = guard(IdentifierSpace::Device);

        assert!(!guard.is_blocked("Mozilla/5.0").await);
        guard.lock("Mozilla/5.0").await.unwrap();
        assert!(guard.is_blocked("Mozilla/5.0").await);
    }

    #[tokio::test]
    async fn test_remaining_attempts_counts_down() {
        let guard = guard(IdentifierSpace::Email);

        assert_eq!(guard.remaining_attempts("b@example.com").await.unwrap(), 5);
        guard.record_failed_attempt("b@example.com").await.unwrap();
        guard.record_failed_attempt("b@example.com").await.unwrap();
        assert_eq!(guard.remaining_attempts("b@example.com").await.unwrap(), 3);

        for _ in 0..10 {
            guard.record_failed_attempt("b@example.com").await.unwrap();
        }
        // Never negative, no matter how far past the limit.
        assert_eq!(guard.remaining_attempts("b@example.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attempt_window_resets_counter() {
        let kv = Arc::new(MemoryKv::new());
        let config = LoginAttemptConfig {
            attempt_window_seconds: 3600,
            max_attempts: 5,
            lock_duration_seconds: 1800,
        };
        let guard = BruteForceGuard::new(kv.clone(), IdentifierSpace::Ip, &config);

        guard.record_failed_attempt("198.51.100.1").await.unwrap();
        guard.record_failed_attempt("198.51.100.1").await.unwrap();

        // Simulate the window lapsing by expiring the counter directly.
        kv.expire(
            "failed_login:ip:198.51.100.1",
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(guard.record_failed_attempt("198.51.100.1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lock_expires() {
        let kv = Arc::new(MemoryKv::new());
        let config = test_config();
        let guard = BruteForceGuard::new(kv.clone(), IdentifierSpace::Ip, &config);

        guard.lock("198.51.100.2").await.unwrap();
        assert!(guard.is_blocked("198.51.100.2").await);

        kv.expire("lock:ip:198.51.100.2", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!guard.is_blocked("198.51.100.2").await);
    }

    #[tokio::test]
    async fn test_spaces_are_isolated() {
        let kv = Arc::new(MemoryKv::new());
        let config = test_config();
        let ip_guard = BruteForceGuard::new(kv.clone(), IdentifierSpace::Ip, &config);
        let email_guard = BruteForceGuard::new(kv, IdentifierSpace::Email, &config);

        // Same raw identifier, locked in one space only.
        ip_guard.lock("shared-value").await.unwrap();
        assert!(ip_guard.is_blocked("shared-value").await);
        assert!(!email_guard.is_blocked("shared-value").await);
    }

    #[tokio::test]
    async fn test_is_blocked_fails_open_on_backend_error() {
        let guard =
            BruteForceGuard::new(Arc::new(FailingKv), IdentifierSpace::Ip, &test_config());
        assert!(!guard.is_blocked("203.0.113.9").await);
    }

    #[tokio::test]
    async fn test_record_propagates_backend_error() {
        let guard =
            BruteForceGuard::new(Arc::new(FailingKv), IdentifierSpace::Ip, &test_config());
        assert!(guard.record_failed_attempt("203.0.113.9").await.is_err());
    }
}
