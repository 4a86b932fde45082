//! Backend key builders
//!
//! Every entity kind stored in the key-value backend gets its own builder
//! here, so a prefix is written in exactly one place and one kind's keys can
//! never drift into another kind's namespace.

use crate::services::failed_login::IdentifierSpace;
use crate::services::rate_limiter::RouteClass;

/// Key for a single session record.
pub(crate) fn session(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// Key for the pointer from a (user, device) pair to its current session.
pub(crate) fn device_session(user_id: &str, user_agent: &str) -> String {
    format!("device_session:{user_id}:{user_agent}")
}

/// Key for the set of live session ids belonging to a user.
pub(crate) fn user_sessions(user_id: &str) -> String {
    format!("user:sessions:{user_id}")
}

/// Key for the failed-attempt counter of an identifier.
///
/// Each identifier space gets its own segment so an IP, a user agent and an
/// email can never share a counter even when their raw values collide.
pub(crate) fn failed_attempts(space: IdentifierSpace, identifier: &str) -> String {
    format!("failed_login:{}:{identifier}", space.as_str())
}

/// Key for the lockout sentinel of an identifier.
pub(crate) fn lock(space: IdentifierSpace, identifier: &str) -> String {
    format!("lock:{}:{identifier}", space.as_str())
}

/// Key for the anti-forgery token bound to a session.
pub(crate) fn csrf(session_id: &str) -> String {
    format!("csrf:{session_id}")
}

/// Key for a fixed-window request counter.
pub(crate) fn rate_limit(class: RouteClass, client_ip: &str) -> String {
    format!("rate_limit:{}:{client_ip}", class.as_str())
}
