//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserProfile;

/// Session record stored in the key-value backend, one per logged-in device.
///
/// The record is keyed by an opaque session id and only lives while its TTL
/// is unexpired; every successful validation refreshes `last_activity` and
/// resets the TTL (sliding expiration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Owning user id
    pub user_id: String,
    /// User's email address
    pub email: String,
    /// Display first name
    pub first_name: String,
    /// Display last name
    pub last_name: String,
    /// Avatar URL, if the user has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Whether the user is an administrator
    pub is_admin: bool,
    /// Whether the user's email is verified
    pub is_verified: bool,
    /// Whether the account is active
    pub is_active: bool,
    /// IP address the session was created from
    pub ip: String,
    /// User agent of the device holding this session
    pub user_agent: String,
    /// When the session was created
    pub login_time: DateTime<Utc>,
    /// Last successful validation
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    /// Build a fresh record for a user logging in from the given client.
    pub fn new(user: &UserProfile, ip: &str, user_agent: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar_url: user.avatar_url.clone(),
            is_admin: user.is_admin,
            is_verified: user.is_verified,
            is_active: user.is_active,
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            login_time: now,
            last_activity: now,
        }
    }

    /// Record a successful validation.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            email: "user@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            avatar_url: None,
            is_admin: false,
            is_verified: true,
            is_active: true,
        }
    }

    #[test]
    fn test_new_copies_identity_fields() {
        let record = SessionRecord::new(&test_user(), "1.2.3.4", "Mozilla/5.0");
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.email, "user@example.com");
        assert_eq!(record.ip, "1.2.3.4");
        assert_eq!(record.user_agent, "Mozilla/5.0");
        assert_eq!(record.login_time, record.last_activity);
    }

    #[test]
    fn test_touch_advances_last_activity() {
        let mut record = SessionRecord::new(&test_user(), "1.2.3.4", "Mozilla/5.0");
        let before = record.last_activity;
        record.touch();
        assert!(record.last_activity >= before);
        assert_eq!(record.login_time, before.min(record.login_time));
    }

    #[test]
    fn test_round_trips_through_json() {
        let record = SessionRecord::new(&test_user(), "1.2.3.4", "Mozilla/5.0");
        let json = serde_json::to_string(&record).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
