//! Admission control: daily creation caps per user and per department
//!
//! Two independent caps apply to the calendar day of the requested start time
//! in the reference zone: a fixed per-user ceiling and the department's own
//! `daily_limit`. Both are enforced; the first one found exhausted (user, then
//! department) is reported.
//!
//! Queries here are snapshots for early feedback. Binding decisions are made
//! by the record store, which evaluates an [`AdmissionCheck`] inside the same
//! atomic unit that inserts the new record.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use common::error::DatabaseResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Department, TimeWindow};
use crate::store::SharedStore;

pub const DEFAULT_USER_DAILY_CEILING: u32 = 5;
/// UTC+05:00
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 300;

/// Admission policy constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Meetings a single user may hold per day
    pub user_daily_ceiling: u32,
    /// Zone whose midnight delimits a "day"
    pub reference_offset: FixedOffset,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            user_daily_ceiling: DEFAULT_USER_DAILY_CEILING,
            reference_offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60)
                .unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl AdmissionPolicy {
    /// Build a policy from a ceiling and a reference offset in minutes east of UTC
    pub fn new(user_daily_ceiling: u32, utc_offset_minutes: i32) -> Option<Self> {
        Some(Self {
            user_daily_ceiling,
            reference_offset: FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?,
        })
    }

    /// The reference-zone calendar day containing `instant`
    pub fn reference_day(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.reference_offset).date_naive()
    }

    /// `[midnight, midnight + 24h)` around `instant` in the reference zone
    pub fn day_window(&self, instant: DateTime<Utc>) -> TimeWindow {
        let local = instant.with_timezone(&self.reference_offset).time();
        let since_midnight = Duration::seconds(i64::from(local.num_seconds_from_midnight()))
            + Duration::nanoseconds(i64::from(local.nanosecond()));
        let start = instant - since_midnight;
        TimeWindow::new(start, start + Duration::days(1))
    }
}

/// Which cap denied admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapScope {
    User,
    Department,
}

impl fmt::Display for CapScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CapScope::User => "per-user",
            CapScope::Department => "department",
        })
    }
}

/// Daily cap reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{scope} daily limit of {limit} reached for {day} ({count} already booked)")]
pub struct AdmissionDenied {
    pub scope: CapScope,
    pub limit: i64,
    pub count: i64,
    pub day: NaiveDate,
}

/// What a count covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountScope {
    All,
    User(Uuid),
    Department(i64),
}

/// Current usage of both caps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionCounts {
    pub user: i64,
    pub department: i64,
}

/// A self-contained admission decision the store evaluates atomically
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionCheck {
    pub user_id: Uuid,
    pub department_id: i64,
    pub window: TimeWindow,
    pub day: NaiveDate,
    pub user_ceiling: i64,
    pub department_limit: i64,
    /// Count pending requests as reservations next to active meetings
    pub include_pending: bool,
}

impl AdmissionCheck {
    pub fn evaluate(&self, counts: AdmissionCounts) -> Result<(), AdmissionDenied> {
        if counts.user >= self.user_ceiling {
            return Err(AdmissionDenied {
                scope: CapScope::User,
                limit: self.user_ceiling,
                count: counts.user,
                day: self.day,
            });
        }

        if counts.department >= self.department_limit {
            return Err(AdmissionDenied {
                scope: CapScope::Department,
                limit: self.department_limit,
                count: counts.department,
                day: self.day,
            });
        }

        Ok(())
    }
}

/// Computes whether a user or department may create another meeting or request
#[derive(Clone)]
pub struct AdmissionController {
    store: SharedStore,
    policy: AdmissionPolicy,
}

impl AdmissionController {
    pub fn new(store: SharedStore, policy: AdmissionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Whether `user_id` is below the per-user ceiling on the day of `reference`
    pub async fn can_create(&self, user_id: Uuid, reference: DateTime<Utc>) -> DatabaseResult<bool> {
        let count = self.meetings_on_day(user_id, reference).await?;
        let allowed = count < i64::from(self.policy.user_daily_ceiling);
        debug!(
            "Admission snapshot for user {}: {} meetings, allowed = {}",
            user_id, count, allowed
        );
        Ok(allowed)
    }

    /// Active meetings created by `user_id` starting on the day of `reference`
    pub async fn meetings_on_day(
        &self,
        user_id: Uuid,
        reference: DateTime<Utc>,
    ) -> DatabaseResult<i64> {
        let window = self.policy.day_window(reference);
        self.store
            .count_active_meetings(CountScope::User(user_id), Some(&window))
            .await
    }

    /// Snapshot evaluation of both caps for a prospective request
    pub async fn check(
        &self,
        user_id: Uuid,
        department: &Department,
        reference: DateTime<Utc>,
    ) -> DatabaseResult<Result<(), AdmissionDenied>> {
        let check = self.request_check(user_id, department, reference);
        let counts = self.store.admission_counts(&check).await?;
        let outcome = check.evaluate(counts);
        if let Err(denied) = &outcome {
            info!("Admission denied for user {}: {}", user_id, denied);
        }
        Ok(outcome)
    }

    /// Check used when submitting a request: pending requests hold a slot
    pub fn request_check(
        &self,
        user_id: Uuid,
        department: &Department,
        reference: DateTime<Utc>,
    ) -> AdmissionCheck {
        self.build_check(user_id, department, reference, true)
    }

    /// Check used when a meeting is created, directly or by promotion
    pub fn meeting_check(
        &self,
        user_id: Uuid,
        department: &Department,
        reference: DateTime<Utc>,
    ) -> AdmissionCheck {
        self.build_check(user_id, department, reference, false)
    }

    fn build_check(
        &self,
        user_id: Uuid,
        department: &Department,
        reference: DateTime<Utc>,
        include_pending: bool,
    ) -> AdmissionCheck {
        AdmissionCheck {
            user_id,
            department_id: department.id,
            window: self.policy.day_window(reference),
            day: self.policy.reference_day(reference),
            user_ceiling: i64::from(self.policy.user_daily_ceiling),
            department_limit: i64::from(department.daily_limit),
            include_pending,
        }
    }
}
