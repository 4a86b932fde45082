//! Services layer - guard components
//!
//! This module contains the guard components of the trust/access layer.
//! Each component owns one concern, talks only to the key-value backend,
//! and is injected wherever it is needed:
//! - Session lifecycle and caps
//! - Failed-login tracking and lockouts
//! - Anti-forgery tokens
//! - Fixed-window rate limiting
//! - Login/registration orchestration on top of the above

pub mod auth;
pub mod csrf;
pub mod failed_login;
pub mod password;
pub mod rate_limiter;
pub mod session;

pub use auth::{AuthError, AuthFlow, LoginInput, LoginOutcome, RegisterInput, UserDirectory};
pub use csrf::CsrfGuard;
pub use failed_login::{BruteForceGuard, BruteForceGuards, IdentifierSpace};
pub use password::{hash_password, verify_password};
pub use rate_limiter::{RateLimitDecision, RateLimiter, RouteClass};
pub use session::{SessionError, SessionStore};
