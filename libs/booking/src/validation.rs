//! Input validation for booking fields
//!
//! The intake dialog uses these parsers to decide whether to advance, and the
//! lifecycle manager runs them again before writing anything.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

pub const MIN_DURATION_MINUTES: i64 = 1;
pub const MAX_DURATION_MINUTES: i64 = 480;
pub const MAX_TITLE_LENGTH: usize = 200;

/// The booking field a validation failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Department,
    Title,
    StartTime,
    Duration,
    Description,
}

/// Malformed or out-of-range user input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("department {0} is not available for booking")]
    DepartmentUnavailable(String),

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("title must be at most {max} characters long")]
    TitleTooLong { max: usize },

    #[error("'{0}' is not a time in HH:MM format")]
    InvalidTimeFormat(String),

    #[error("start time {0} is not in the future")]
    StartTimeNotInFuture(DateTime<Utc>),

    #[error("'{0}' is not a whole number of minutes")]
    DurationNotNumeric(String),

    #[error("duration {0} is outside the 1..=480 minute range")]
    DurationOutOfRange(i64),
}

impl ValidationError {
    pub fn field(&self) -> Field {
        match self {
            ValidationError::DepartmentUnavailable(_) => Field::Department,
            ValidationError::EmptyTitle | ValidationError::TitleTooLong { .. } => Field::Title,
            ValidationError::InvalidTimeFormat(_) | ValidationError::StartTimeNotInFuture(_) => {
                Field::StartTime
            }
            ValidationError::DurationNotNumeric(_) | ValidationError::DurationOutOfRange(_) => {
                Field::Duration
            }
        }
    }
}

/// Validate and normalize a meeting title
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }

    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong {
            max: MAX_TITLE_LENGTH,
        });
    }

    Ok(title.to_string())
}

/// Parse `HH:MM` and anchor it to today's date in the reference zone
///
/// A time already past today is rejected, never rolled over to tomorrow.
pub fn parse_start_time(
    input: &str,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, ValidationError> {
    static TIME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = TIME_REGEX
        .get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{1,2})$").expect("Failed to compile time regex"));

    let input = input.trim();
    let invalid = || ValidationError::InvalidTimeFormat(input.to_string());

    let captures = regex.captures(input).ok_or_else(invalid)?;
    let hour: u32 = captures[1].parse().map_err(|_| invalid())?;
    let minute: u32 = captures[2].parse().map_err(|_| invalid())?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)?;

    let today = now.with_timezone(&offset).date_naive();
    let start = today
        .and_time(time)
        .and_local_timezone(offset)
        .single()
        .ok_or_else(invalid)?
        .with_timezone(&Utc);

    ensure_future(start, now)?;
    Ok(start)
}

/// Reject instants that are not strictly after `now`
pub fn ensure_future(start: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if start <= now {
        return Err(ValidationError::StartTimeNotInFuture(start));
    }
    Ok(())
}

/// Parse a duration in whole minutes within the allowed range
pub fn parse_duration(input: &str) -> Result<i32, ValidationError> {
    let input = input.trim();
    let minutes: i64 = input
        .parse()
        .map_err(|_| ValidationError::DurationNotNumeric(input.to_string()))?;
    ensure_duration(minutes)?;
    Ok(minutes as i32)
}

/// Check a duration against the allowed range
pub fn ensure_duration(minutes: i64) -> Result<(), ValidationError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(ValidationError::DurationOutOfRange(minutes));
    }
    Ok(())
}
