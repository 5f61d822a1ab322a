//! Request and response bodies of the API service

use booking::models::{BookingRequest, BookingStatus, Meeting, MeetingStatus, MeetingUpdate};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

fn page_size(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestQuery {
    pub status: Option<BookingStatus>,
    pub department_id: Option<i64>,
    pub limit: Option<i64>,
}

impl RequestQuery {
    pub fn page_size(&self) -> i64 {
        page_size(self.limit)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MeetingQuery {
    pub status: Option<MeetingStatus>,
    pub department_id: Option<i64>,
    /// Calendar day in the reference zone, `YYYY-MM-DD`
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

impl MeetingQuery {
    pub fn page_size(&self) -> i64 {
        page_size(self.limit)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Provisioning details attached to a meeting
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMeetingRequest {
    pub external_meeting_id: Option<String>,
    pub join_url: Option<String>,
    pub passcode: Option<String>,
}

impl From<UpdateMeetingRequest> for MeetingUpdate {
    fn from(body: UpdateMeetingRequest) -> Self {
        MeetingUpdate {
            external_meeting_id: body.external_meeting_id,
            join_url: body.join_url,
            passcode: body.passcode,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeetingResponse {
    #[serde(flatten)]
    pub meeting: Meeting,
    pub end_time: DateTime<Utc>,
}

impl From<Meeting> for MeetingResponse {
    fn from(meeting: Meeting) -> Self {
        let end_time = meeting.end_time();
        Self { meeting, end_time }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingRequestResponse {
    #[serde(flatten)]
    pub request: BookingRequest,
    pub end_time: DateTime<Utc>,
}

impl From<BookingRequest> for BookingRequestResponse {
    fn from(request: BookingRequest) -> Self {
        let end_time = request.end_time();
        Self { request, end_time }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T> ListResponse<T> {
    pub fn new<S: Into<T>>(items: Vec<S>) -> Self {
        let items: Vec<T> = items.into_iter().map(Into::into).collect();
        Self {
            count: items.len(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_clamped() {
        assert_eq!(RequestQuery::default().page_size(), 50);
        assert_eq!(
            MeetingQuery {
                limit: Some(10_000),
                ..Default::default()
            }
            .page_size(),
            200
        );
        assert_eq!(
            RequestQuery {
                limit: Some(0),
                ..Default::default()
            }
            .page_size(),
            1
        );
    }

    #[test]
    fn test_meeting_query_parses_date_and_status() {
        let query: MeetingQuery =
            serde_json::from_str(r#"{"status": "scheduled", "date": "2025-03-10"}"#).unwrap();
        assert_eq!(query.status, Some(MeetingStatus::Scheduled));
        assert_eq!(query.date, NaiveDate::from_ymd_opt(2025, 3, 10));
    }

    #[test]
    fn test_update_body_only_touches_provisioning_fields() {
        let update: MeetingUpdate = UpdateMeetingRequest {
            join_url: Some("https://meet.example/abc".to_string()),
            ..Default::default()
        }
        .into();

        assert_eq!(update.join_url.as_deref(), Some("https://meet.example/abc"));
        assert!(update.status.is_none());
        assert!(update.is_active.is_none());
    }
}
