//! Fixed-window rate limiting per route class and client IP
//!
//! A request increments an atomic counter keyed by (route class, IP). The
//! first increment of a window sets the window's TTL; when the counter passes
//! the class's ceiling, further requests in that window are refused. Windows
//! are fixed, not sliding, so a burst at a window boundary can briefly see up
//! to twice the ceiling.

use std::time::Duration;

use tracing::warn;

use crate::config::RateLimitConfig;
use crate::keys;
use crate::kv::{DynKvBackend, KvError};

/// Route classes with independent ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Credential-bearing routes: login, registration, password reset
    Sensitive,
    /// Everything else that still deserves a ceiling
    Loose,
}

impl RouteClass {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Sensitive => "sensitive",
            Self::Loose => "loose",
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Under the ceiling, let the request through
    Allowed,
    /// Over the ceiling for this window
    Limited,
}

/// Fixed-window rate limiter backed by the key-value layer.
pub struct RateLimiter {
    kv: DynKvBackend,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(kv: DynKvBackend, config: &RateLimitConfig) -> Self {
        Self {
            kv,
            config: config.clone(),
        }
    }

    /// Count one request and decide whether it is allowed.
    ///
    /// Counting errors propagate so middleware can decide its own policy for
    /// a degraded backend.
    pub async fn check(
        &self,
        class: RouteClass,
        client_ip: &str,
    ) -> Result<RateLimitDecision, KvError> {
        let rule = match class {
            RouteClass::Sensitive => self.config.sensitive,
            RouteClass::Loose => self.config.loose,
        };

        let key = keys::rate_limit(class, client_ip);
        let requests = self.kv.incr(&key).await?;
        if requests == 1 {
            self.kv
                .expire(&key, Duration::from_millis(rule.window_ms))
                .await?;
        }

        if requests > rule.max_requests {
            warn!(
                class = class.as_str(),
                client_ip,
                requests,
                limit = rule.max_requests,
                "Rate limit exceeded"
            );
            return Ok(RateLimitDecision::Limited);
        }

        Ok(RateLimitDecision::Allowed)
    }
}
