//! Configuration management
//!
//! This module handles loading and parsing configuration for the guard layer.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Key-value backend configuration
    #[serde(default)]
    pub kv: KvConfig,
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Failed-login tracking configuration
    #[serde(default)]
    pub login_attempts: LoginAttemptConfig,
    /// Anti-forgery token configuration
    #[serde(default)]
    pub csrf: CsrfConfig,
    /// Rate-limit configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kv: KvConfig::default(),
            session: SessionConfig::default(),
            login_attempts: LoginAttemptConfig::default(),
            csrf: CsrfConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Key-value backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    /// Backend driver (memory or redis)
    #[serde(default)]
    pub driver: KvDriver,
    /// Redis connection URL (required for the redis driver)
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            driver: KvDriver::default(),
            redis_url: None,
        }
    }
}

/// Key-value backend driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KvDriver {
    /// In-memory (default; tests and single-instance deployment)
    #[default]
    Memory,
    /// Redis (shared, multi-instance deployment)
    Redis,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session time-to-live in seconds, refreshed on every validation
    #[serde(default = "default_session_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Maximum concurrent sessions per user
    #[serde(default = "default_max_active_sessions")]
    pub max_active_sessions: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl_seconds(),
            max_active_sessions: default_max_active_sessions(),
        }
    }
}

fn default_session_ttl_seconds() -> u64 {
    7 * 24 * 60 * 60 // 7 days
}

fn default_max_active_sessions() -> u64 {
    5
}

/// Failed-login tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttemptConfig {
    /// Counter window in seconds; attempts reset after this much inactivity
    #[serde(default = "default_attempt_window_seconds")]
    pub attempt_window_seconds: u64,
    /// Failures tolerated inside a window before a lockout
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    /// Lockout duration in seconds
    #[serde(default = "default_lock_duration_seconds")]
    pub lock_duration_seconds: u64,
}

impl Default for LoginAttemptConfig {
    fn default() -> Self {
        Self {
            attempt_window_seconds: default_attempt_window_seconds(),
            max_attempts: default_max_attempts(),
            lock_duration_seconds: default_lock_duration_seconds(),
        }
    }
}

fn default_attempt_window_seconds() -> u64 {
    60 * 60 // 1 hour
}

fn default_max_attempts() -> i64 {
    5
}

fn default_lock_duration_seconds() -> u64 {
    30 * 60 // 30 minutes
}

/// Anti-forgery token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Token time-to-live in seconds
    #[serde(default = "default_csrf_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_csrf_ttl_seconds(),
        }
    }
}

fn default_csrf_ttl_seconds() -> u64 {
    30 * 60 // 30 minutes
}

/// One fixed-window rate-limit rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests allowed inside one window
    pub max_requests: i64,
}

/// Rate-limit configuration, one rule per route class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sensitive routes (login, registration, password reset)
    #[serde(default = "default_sensitive_rule")]
    pub sensitive: RateLimitRule,
    /// Everything else that still deserves a ceiling
    #[serde(default = "default_loose_rule")]
    pub loose: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sensitive: default_sensitive_rule(),
            loose: default_loose_rule(),
        }
    }
}

fn default_sensitive_rule() -> RateLimitRule {
    RateLimitRule {
        window_ms: 15 * 60 * 1000, // 15 minutes
        max_requests: 6,
    }
}

fn default_loose_rule() -> RateLimitRule {
    RateLimitRule {
        window_ms: 60 * 1000, // 1 minute
        max_requests: 20,
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        // Missing file means defaults, not an error.
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - WARDEN_KV_DRIVER
    /// - WARDEN_KV_REDIS_URL
    /// - WARDEN_SESSION_TTL_SECONDS
    /// - WARDEN_SESSION_MAX_ACTIVE
    /// - WARDEN_LOGIN_ATTEMPT_WINDOW_SECONDS
    /// - WARDEN_LOGIN_MAX_ATTEMPTS
    /// - WARDEN_LOGIN_LOCK_DURATION_SECONDS
    /// - WARDEN_CSRF_TTL_SECONDS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(driver) = std::env::var("WARDEN_KV_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.kv.driver = KvDriver::Memory,
                "redis" => self.kv.driver = KvDriver::Redis,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(redis_url) = std::env::var("WARDEN_KV_REDIS_URL") {
            self.kv.redis_url = Some(redis_url);
        }

        if let Ok(ttl) = std::env::var("WARDEN_SESSION_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.session.ttl_seconds = ttl;
            }
        }
        if let Ok(max) = std::env::var("WARDEN_SESSION_MAX_ACTIVE") {
            if let Ok(max) = max.parse::<u64>() {
                self.session.max_active_sessions = max;
            }
        }

        if let Ok(window) = std::env::var("WARDEN_LOGIN_ATTEMPT_WINDOW_SECONDS") {
            if let Ok(window) = window.parse::<u64>() {
                self.login_attempts.attempt_window_seconds = window;
            }
        }
        if let Ok(max) = std::env::var("WARDEN_LOGIN_MAX_ATTEMPTS") {
            if let Ok(max) = max.parse::<i64>() {
                self.login_attempts.max_attempts = max;
            }
        }
        if let Ok(duration) = std::env::var("WARDEN_LOGIN_LOCK_DURATION_SECONDS") {
            if let Ok(duration) = duration.parse::<u64>() {
                self.login_attempts.lock_duration_seconds = duration;
            }
        }

        if let Ok(ttl) = std::env::var("WARDEN_CSRF_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.csrf.ttl_seconds = ttl;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
