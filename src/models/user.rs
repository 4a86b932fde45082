//! User shapes exchanged with the external user store
//!
//! The guard layer never owns user data; it only consumes these shapes from
//! the relational store behind the [`UserDirectory`] boundary.
//!
//! [`UserDirectory`]: crate::services::auth::UserDirectory

use serde::{Deserialize, Serialize};

/// Public profile of a user, as returned by the user store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Unique identifier (opaque string)
    pub id: String,
    /// Email address (unique)
    pub email: String,
    /// Display first name
    pub first_name: String,
    /// Display last name
    pub last_name: String,
    /// Avatar URL, if set
    pub avatar_url: Option<String>,
    /// Whether the user is an administrator
    pub is_admin: bool,
    /// Whether the user's email is verified
    pub is_verified: bool,
    /// Whether the account is active
    pub is_active: bool,
}

/// Profile plus credential material, used only during authentication.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user's profile
    pub profile: UserProfile,
    /// Stored password hash (PHC string)
    pub password_hash: String,
}

/// Input for creating a user through the directory boundary.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Email address
    pub email: String,
    /// Display first name
    pub first_name: String,
    /// Display last name
    pub last_name: String,
    /// Already-hashed password (PHC string)
    pub password_hash: String,
}
