//! Data models
//!
//! This module contains the data structures used throughout the guard layer.
//! Models represent:
//! - Backend entities (SessionRecord)
//! - Shapes exchanged with the external user store (UserProfile, AuthUser)

mod session;
mod user;

pub use session::SessionRecord;
pub use user::{AuthUser, NewUser, UserProfile};
