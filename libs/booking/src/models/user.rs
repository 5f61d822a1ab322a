//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat user known to the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Identity in the chat system (e.g. the Telegram user id)
    pub external_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// Staff members review requests and manage meetings
    pub is_staff: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// `@username` when one is set, otherwise the full name
    pub fn display_name(&self) -> String {
        match self.username.as_deref() {
            Some(username) if !username.is_empty() => format!("@{}", username),
            _ => format!("{} {}", self.first_name, self.last_name)
                .trim()
                .to_string(),
        }
    }
}

/// New user creation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub external_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            external_id: 42,
            username: username.map(str::to_string),
            first_name: "Aziza".to_string(),
            last_name: "Karimova".to_string(),
            is_staff: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_prefers_username() {
        assert_eq!(user(Some("aziza")).display_name(), "@aziza");
    }

    #[test]
    fn test_display_name_falls_back_to_full_name() {
        assert_eq!(user(None).display_name(), "Aziza Karimova");
        assert_eq!(user(Some("")).display_name(), "Aziza Karimova");
    }
}
