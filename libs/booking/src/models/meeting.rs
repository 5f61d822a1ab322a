//! Meeting model

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{TimeWindow, UnknownStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::Active => "active",
            MeetingStatus::Ended => "ended",
            MeetingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MeetingStatus::Scheduled),
            "active" => Ok(MeetingStatus::Active),
            "ended" => Ok(MeetingStatus::Ended),
            "cancelled" => Ok(MeetingStatus::Cancelled),
            other => Err(UnknownStatus {
                kind: "meeting",
                value: other.to_string(),
            }),
        }
    }
}

/// A confirmed online meeting
///
/// The end time is never stored; [`Meeting::end_time`] always derives it from
/// `start_time` and `duration_minutes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    /// Identifier assigned by the conferencing provider
    pub external_meeting_id: Option<String>,
    pub title: String,
    pub description: String,
    pub department_id: i64,
    pub created_by: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub join_url: Option<String>,
    pub passcode: Option<String>,
    pub status: MeetingStatus,
    /// Soft-delete flag; inactive meetings are invisible and never counted
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Meeting {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// New meeting payload; meetings are created `scheduled` and active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeeting {
    pub title: String,
    pub description: String,
    pub department_id: i64,
    pub created_by: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
}

/// Partial meeting update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeetingUpdate {
    pub status: Option<MeetingStatus>,
    pub is_active: Option<bool>,
    pub external_meeting_id: Option<String>,
    pub join_url: Option<String>,
    pub passcode: Option<String>,
}

impl MeetingUpdate {
    pub fn status(status: MeetingStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, meeting: &mut Meeting, at: DateTime<Utc>) {
        if let Some(status) = self.status {
            meeting.status = status;
        }
        if let Some(is_active) = self.is_active {
            meeting.is_active = is_active;
        }
        if let Some(id) = &self.external_meeting_id {
            meeting.external_meeting_id = Some(id.clone());
        }
        if let Some(url) = &self.join_url {
            meeting.join_url = Some(url.clone());
        }
        if let Some(passcode) = &self.passcode {
            meeting.passcode = Some(passcode.clone());
        }
        meeting.updated_at = at;
    }
}

/// Listing filter for meetings; results are ordered by start time descending
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeetingFilter {
    pub status: Option<MeetingStatus>,
    pub department_id: Option<i64>,
    pub created_by: Option<Uuid>,
    pub starts_within: Option<TimeWindow>,
    /// Include soft-deleted meetings
    pub include_inactive: bool,
    /// Order by start time ascending instead of descending
    pub ascending: bool,
    pub limit: Option<i64>,
}

impl MeetingFilter {
    pub fn matches(&self, meeting: &Meeting) -> bool {
        (self.include_inactive || meeting.is_active)
            && self.status.is_none_or(|s| meeting.status == s)
            && self.department_id.is_none_or(|d| meeting.department_id == d)
            && self.created_by.is_none_or(|u| meeting.created_by == u)
            && self
                .starts_within
                .is_none_or(|w| w.contains(meeting.start_time))
    }
}

/// Calendar date helper used by dashboard filters
pub fn date_window(date: NaiveDate, offset: chrono::FixedOffset) -> Option<TimeWindow> {
    let start = date
        .and_hms_opt(0, 0, 0)?
        .and_local_timezone(offset)
        .single()?
        .with_timezone(&Utc);
    Some(TimeWindow::new(start, start + Duration::days(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meeting(start: DateTime<Utc>, duration: i32) -> Meeting {
        Meeting {
            id: Uuid::new_v4(),
            external_meeting_id: None,
            title: "Team sync".to_string(),
            description: String::new(),
            department_id: 1,
            created_by: Uuid::new_v4(),
            start_time: start,
            duration_minutes: duration,
            join_url: None,
            passcode: None,
            status: MeetingStatus::Scheduled,
            is_active: true,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_end_time_follows_inputs() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut m = meeting(start, 45);
        assert_eq!(m.end_time(), start + Duration::minutes(45));

        m.duration_minutes = 90;
        assert_eq!(m.end_time(), start + Duration::minutes(90));

        m.start_time = start + Duration::hours(2);
        assert_eq!(m.end_time(), start + Duration::minutes(210));
    }

    #[test]
    fn test_filter_hides_inactive_by_default() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut m = meeting(start, 30);
        m.is_active = false;

        assert!(!MeetingFilter::default().matches(&m));
        let all = MeetingFilter {
            include_inactive: true,
            ..Default::default()
        };
        assert!(all.matches(&m));
    }

    #[test]
    fn test_date_window_uses_reference_offset() {
        let offset = chrono::FixedOffset::east_opt(5 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let window = date_window(date, offset).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 3, 9, 19, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2025, 3, 10, 19, 0, 0).unwrap());
    }
}
