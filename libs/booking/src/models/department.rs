//! Department model and membership relation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Organizational unit meetings are booked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Meetings-per-day cap for this department
    pub daily_limit: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A user administering a department; only active memberships may book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentMembership {
    pub user_id: Uuid,
    pub department_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Active meeting count for one department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentCount {
    pub department_id: i64,
    pub department_name: String,
    pub count: i64,
}
