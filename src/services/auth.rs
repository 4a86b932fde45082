//! Login, registration, and logout orchestration
//!
//! `AuthFlow` wires the guard components together in the order a request
//! would hit them: lockout checks first, then honeypot, then credential
//! verification, then session bookkeeping. Credential failures are reported
//! with one generic error regardless of cause, so responses do not reveal
//! whether an email is registered.

use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::rand_core::{OsRng, RngCore};
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::models::{AuthUser, NewUser, UserProfile};
use crate::services::csrf::CsrfGuard;
use crate::services::failed_login::BruteForceGuards;
use crate::services::password::{hash_password, verify_password, DUMMY_PASSWORD_HASH};
use crate::services::session::{SessionError, SessionStore};

/// Where user accounts live.
///
/// The flow only needs credential lookup and account creation; persistence
/// details stay behind this trait so tests inject an in-memory directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by email, including the stored password hash.
    async fn find_for_auth(&self, email: &str) -> anyhow::Result<Option<AuthUser>>;

    /// Create a new account and return its profile.
    async fn create(&self, user: NewUser) -> anyhow::Result<UserProfile>;
}

/// Error type for authentication operations
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client is locked out after too many failures
    #[error("temporarily blocked due to too many failed attempts")]
    Blocked,

    /// Wrong email or password; deliberately does not say which
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Password and confirmation differ
    #[error("passwords do not match")]
    PasswordMismatch,

    /// Registration could not complete; deliberately unspecific
    #[error("registration failed")]
    RegistrationFailed,

    /// The user is at the concurrent session cap
    #[error("maximum number of active sessions reached")]
    SessionLimit,

    /// The presented session is unknown or expired
    #[error("invalid or expired session")]
    InvalidSession,

    /// An internal component failed
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Login request fields.
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    /// Hidden form field; any non-empty value marks the client as a bot.
    pub honeypot: Option<String>,
}

/// Registration request fields.
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub confirm_password: String,
    pub honeypot: Option<String>,
}

/// A successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserProfile,
    pub session_id: String,
}

/// Authentication orchestrator.
pub struct AuthFlow {
    directory: Arc<dyn UserDirectory>,
    sessions: Arc<SessionStore>,
    csrf: Arc<CsrfGuard>,
    guards: BruteForceGuards,
}

impl AuthFlow {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        sessions: Arc<SessionStore>,
        csrf: Arc<CsrfGuard>,
        guards: BruteForceGuards,
    ) -> Self {
        Self {
            directory,
            sessions,
            csrf,
            guards,
        }
    }

    /// Authenticate a user and open a session for their device.
    ///
    /// A fresh login from a device the user already has a session on replaces
    /// that session instead of consuming another slot.
    pub async fn login(
        &self,
        input: LoginInput,
        ip: &str,
        user_agent: &str,
    ) -> Result<LoginOutcome, AuthError> {
        info!(email = %input.email, "Login attempt");

        if self.guards.ip.is_blocked(ip).await
            || self.guards.device.is_blocked(user_agent).await
            || self.guards.email.is_blocked(&input.email).await
        {
            warn!(email = %input.email, ip, "Login refused, client is locked out");
            return Err(AuthError::Blocked);
        }

        if honeypot_tripped(input.honeypot.as_deref()) {
            self.handle_honeypot(ip, user_agent).await;
            return Err(AuthError::InvalidCredentials);
        }

        let user = self.directory.find_for_auth(&input.email).await?;

        // Unknown emails still pay for a full hash verification, keeping the
        // response time indistinguishable from a wrong password.
        let stored_hash = user
            .as_ref()
            .map(|u| u.password_hash.as_str())
            .unwrap_or(DUMMY_PASSWORD_HASH);
        let password_valid = verify_password(&input.password, stored_hash).unwrap_or(false);

        let Some(user) = user.filter(|_| password_valid) else {
            self.note_failure(ip, user_agent, &input.email).await;
            warn!(email = %input.email, "Invalid email or password");
            return Err(AuthError::InvalidCredentials);
        };

        self.clear_failures(ip, user_agent, &input.email).await;

        // Replace any session this device already holds before opening a new
        // one, so repeated logins from one device never eat into the cap.
        if let Some(old_id) = self
            .sessions
            .device_session_id(&user.profile.id, user_agent)
            .await
            .map_err(session_internal)?
        {
            self.sessions
                .destroy_session(&old_id)
                .await
                .map_err(session_internal)?;
        }

        let session_id = self
            .sessions
            .create_session(&user.profile, ip, user_agent)
            .await
            .map_err(|err| match err {
                SessionError::LimitExceeded => AuthError::SessionLimit,
                other => session_internal(other),
            })?;

        info!(user_id = %user.profile.id, "Login succeeded");
        Ok(LoginOutcome {
            user: user.profile,
            session_id,
        })
    }

    /// Create a new account.
    ///
    /// Duplicate emails and honeypot trips both come back as the same
    /// unspecific error.
    pub async fn register(
        &self,
        input: RegisterInput,
        ip: &str,
        user_agent: &str,
    ) -> Result<UserProfile, AuthError> {
        info!(email = %input.email, "Registration attempt");

        if self.guards.ip.is_blocked(ip).await || self.guards.device.is_blocked(user_agent).await {
            warn!(email = %input.email, ip, "Registration refused, client is locked out");
            return Err(AuthError::Blocked);
        }

        if honeypot_tripped(input.honeypot.as_deref()) {
            self.handle_honeypot(ip, user_agent).await;
            return Err(AuthError::RegistrationFailed);
        }

        if input.password != input.confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        if self.directory.find_for_auth(&input.email).await?.is_some() {
            warn!(email = %input.email, "Registration for an already-registered email");
            return Err(AuthError::RegistrationFailed);
        }

        let password_hash = hash_password(&input.password)?;
        let profile = self
            .directory
            .create(NewUser {
                email: input.email,
                first_name: input.first_name,
                last_name: input.last_name,
                password_hash,
            })
            .await?;

        info!(user_id = %profile.id, "Registration succeeded");
        Ok(profile)
    }

    /// Log out: destroy every session the user holds, not just this one, and
    /// drop the session's anti-forgery token.
    pub async fn logout(&self, session_id: &str) -> Result<u64, AuthError> {
        let record = self
            .sessions
            .validate_session(session_id)
            .await
            .ok_or(AuthError::InvalidSession)?;

        let destroyed = self
            .sessions
            .destroy_all_user_sessions(&record.user_id)
            .await
            .map_err(session_internal)?;

        if let Err(err) = self.csrf.delete_token(session_id).await {
            error!(error = %err, "Failed to drop anti-forgery token on logout");
        }

        info!(user_id = %record.user_id, destroyed, "Logout complete");
        Ok(destroyed)
    }

    /// A tripped honeypot locks the client's IP and device and burns a
    /// little time so the response does not stand out from a real attempt.
    async fn handle_honeypot(&self, ip: &str, user_agent: &str) {
        warn!(ip, "Honeypot field filled, treating client as a bot");
        simulate_processing().await;
        if let Err(err) = self.guards.ip.lock(ip).await {
            error!(error = %err, "Failed to lock IP after honeypot trip");
        }
        if let Err(err) = self.guards.device.lock(user_agent).await {
            error!(error = %err, "Failed to lock device after honeypot trip");
        }
    }

    /// Record the failure in all three identifier spaces. Recording errors
    /// are logged, not surfaced; the login error the caller sees is already
    /// decided.
    async fn note_failure(&self, ip: &str, user_agent: &str, email: &str) {
        if let Err(err) = self.guards.ip.record_failed_attempt(ip).await {
            error!(error = %err, "Failed to record IP failure");
        }
        if let Err(err) = self.guards.device.record_failed_attempt(user_agent).await {
            error!(error = %err, "Failed to record device failure");
        }
        if let Err(err) = self.guards.email.record_failed_attempt(email).await {
            error!(error = %err, "Failed to record email failure");
        }
    }

    async fn clear_failures(&self, ip: &str, user_agent: &str, email: &str) {
        if let Err(err) = self.guards.ip.clear_attempts(ip).await {
            error!(error = %err, "Failed to clear IP failures");
        }
        if let Err(err) = self.guards.device.clear_attempts(user_agent).await {
            error!(error = %err, "Failed to clear device failures");
        }
        if let Err(err) = self.guards.email.clear_attempts(email).await {
            error!(error = %err, "Failed to clear email failures");
        }
    }
}

fn honeypot_tripped(honeypot: Option<&str>) -> bool {
    honeypot.is_some_and(|value| !value.is_empty())
}

fn session_internal(err: SessionError) -> AuthError {
    AuthError::Internal(err.into())
}

/// Sleep for a random 100-300ms, roughly the cost of a real verification.
async fn simulate_processing() {
    let jitter = u64::from(OsRng.next_u32() % 200);
    tokio::time::sleep(Duration::from_millis(100 + jitter)).await;
}
