//! Booking request model and its lifecycle status

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownStatus;

/// Request status; everything except `Pending` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "approved" => Ok(BookingStatus::Approved),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownStatus {
                kind: "booking request",
                value: other.to_string(),
            }),
        }
    }
}

/// A request for a meeting awaiting (or past) staff review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Uuid,
    pub department_id: i64,
    pub requested_by: Uuid,
    pub title: String,
    pub description: String,
    pub preferred_start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: BookingStatus,
    pub rejection_reason: Option<String>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRequest {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.preferred_start_time + Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// New booking request payload; always created `pending`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBookingRequest {
    pub department_id: i64,
    pub requested_by: Uuid,
    pub title: String,
    pub description: String,
    pub preferred_start_time: DateTime<Utc>,
    pub duration_minutes: i32,
}

/// Fields written when a pending request reaches a terminal status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTransition {
    pub status: BookingStatus,
    pub rejection_reason: Option<String>,
    pub processed_by: Option<Uuid>,
    pub processed_at: DateTime<Utc>,
}

impl RequestTransition {
    pub fn approve(reviewer: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            status: BookingStatus::Approved,
            rejection_reason: None,
            processed_by: Some(reviewer),
            processed_at: at,
        }
    }

    pub fn reject(reviewer: Uuid, reason: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: BookingStatus::Rejected,
            rejection_reason: reason,
            processed_by: Some(reviewer),
            processed_at: at,
        }
    }

    pub fn cancel(actor: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            status: BookingStatus::Cancelled,
            rejection_reason: None,
            processed_by: Some(actor),
            processed_at: at,
        }
    }

    /// Apply this transition to an in-memory copy of a request
    pub fn apply_to(&self, request: &mut BookingRequest) {
        request.status = self.status;
        request.rejection_reason = self.rejection_reason.clone();
        request.processed_by = self.processed_by;
        request.processed_at = Some(self.processed_at);
        request.updated_at = self.processed_at;
    }
}

/// Listing filter for booking requests; results are newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingRequestFilter {
    pub status: Option<BookingStatus>,
    pub department_id: Option<i64>,
    pub requested_by: Option<Uuid>,
    pub limit: Option<i64>,
}

impl BookingRequestFilter {
    pub fn matches(&self, request: &BookingRequest) -> bool {
        self.status.is_none_or(|s| request.status == s)
            && self.department_id.is_none_or(|d| request.department_id == d)
            && self.requested_by.is_none_or(|u| request.requested_by == u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Approved,
            BookingStatus::Rejected,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>(), Ok(status));
        }
        assert!("archived".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_only_pending_is_open() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(BookingStatus::Approved.is_terminal());
        assert!(BookingStatus::Rejected.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
    }
}
