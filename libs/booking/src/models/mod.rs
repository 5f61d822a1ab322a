//! Booking domain models

pub mod booking_request;
pub mod department;
pub mod meeting;
pub mod user;

// Re-export for convenience
pub use booking_request::{
    BookingRequest, BookingRequestFilter, BookingStatus, NewBookingRequest, RequestTransition,
};
pub use department::{Department, DepartmentCount, DepartmentMembership};
pub use meeting::{Meeting, MeetingFilter, MeetingStatus, MeetingUpdate, NewMeeting};
pub use user::{NewUser, User};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open time slice `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Error returned when a stored status string is not a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}
