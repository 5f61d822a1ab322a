//! Aggregate counts for the staff dashboard

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::admission::CountScope;
use crate::clock::Clock;
use crate::error::{BookingError, BookingResult, Entity};
use crate::models::{
    BookingRequest, BookingRequestFilter, BookingStatus, Department, DepartmentCount,
    DepartmentMembership, Meeting, MeetingFilter, TimeWindow,
};
use crate::store::SharedStore;

const RECENT_LIMIT: i64 = 5;

/// Active meeting counts over calendar periods in the reference zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeetingStats {
    pub total: i64,
    pub today: i64,
    /// ISO week, Monday first
    pub this_week: i64,
    pub this_month: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_meetings: i64,
    pub today_meetings: i64,
    pub pending_requests: i64,
    pub active_departments: usize,
    pub recent_meetings: Vec<Meeting>,
    pub recent_requests: Vec<BookingRequest>,
    pub department_counts: Vec<DepartmentCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentSummary {
    pub department: Department,
    pub meeting_count: i64,
    pub request_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentDetail {
    pub department: Department,
    pub meetings: Vec<Meeting>,
    pub requests: Vec<BookingRequest>,
    pub admins: Vec<DepartmentMembership>,
}

/// `[from 00:00, until 00:00)` in the reference zone
fn local_span(from: NaiveDate, until: NaiveDate, offset: FixedOffset) -> Option<TimeWindow> {
    let midnight = |date: NaiveDate| -> Option<DateTime<Utc>> {
        Some(
            date.and_hms_opt(0, 0, 0)?
                .and_local_timezone(offset)
                .single()?
                .with_timezone(&Utc),
        )
    };
    Some(TimeWindow::new(midnight(from)?, midnight(until)?))
}

/// Today, this ISO week and this month around `now`
pub fn periods(now: DateTime<Utc>, offset: FixedOffset) -> Option<(TimeWindow, TimeWindow, TimeWindow)> {
    let today = now.with_timezone(&offset).date_naive();
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let first_of_month = today.with_day(1)?;
    let first_of_next = if first_of_month.month() == 12 {
        NaiveDate::from_ymd_opt(first_of_month.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(first_of_month.year(), first_of_month.month() + 1, 1)?
    };

    Some((
        local_span(today, today + Duration::days(1), offset)?,
        local_span(monday, monday + Duration::days(7), offset)?,
        local_span(first_of_month, first_of_next, offset)?,
    ))
}

#[derive(Clone)]
pub struct Reporter {
    store: SharedStore,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl Reporter {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self {
            store,
            clock,
            offset,
        }
    }

    pub async fn meeting_stats(&self) -> BookingResult<MeetingStats> {
        let all = CountScope::All;
        let total = self.store.count_active_meetings(all, None).await?;
        let Some((today, week, month)) = periods(self.clock.now(), self.offset) else {
            return Ok(MeetingStats {
                total,
                today: 0,
                this_week: 0,
                this_month: 0,
            });
        };

        Ok(MeetingStats {
            total,
            today: self.store.count_active_meetings(all, Some(&today)).await?,
            this_week: self.store.count_active_meetings(all, Some(&week)).await?,
            this_month: self.store.count_active_meetings(all, Some(&month)).await?,
        })
    }

    pub async fn department_stats(&self) -> BookingResult<Vec<DepartmentCount>> {
        Ok(self.store.meeting_counts_by_department().await?)
    }

    pub async fn dashboard(&self) -> BookingResult<DashboardSummary> {
        let stats = self.meeting_stats().await?;
        let pending_requests = self
            .store
            .count_booking_requests(&BookingRequestFilter {
                status: Some(BookingStatus::Pending),
                ..Default::default()
            })
            .await?;
        let active_departments = self.store.list_active_departments().await?.len();

        let recent_meetings = self
            .store
            .list_meetings(&MeetingFilter {
                limit: Some(RECENT_LIMIT),
                ..Default::default()
            })
            .await?;
        let recent_requests = self
            .store
            .list_booking_requests(&BookingRequestFilter {
                status: Some(BookingStatus::Pending),
                limit: Some(RECENT_LIMIT),
                ..Default::default()
            })
            .await?;
        let mut department_counts = self.store.meeting_counts_by_department().await?;
        department_counts.truncate(RECENT_LIMIT as usize);

        Ok(DashboardSummary {
            total_meetings: stats.total,
            today_meetings: stats.today,
            pending_requests,
            active_departments,
            recent_meetings,
            recent_requests,
            department_counts,
        })
    }

    pub async fn department_summaries(&self) -> BookingResult<Vec<DepartmentSummary>> {
        let departments = self.store.list_departments().await?;
        let mut summaries = Vec::with_capacity(departments.len());
        for department in departments {
            let meeting_count = self
                .store
                .count_active_meetings(CountScope::Department(department.id), None)
                .await?;
            let request_count = self
                .store
                .count_booking_requests(&BookingRequestFilter {
                    department_id: Some(department.id),
                    ..Default::default()
                })
                .await?;
            summaries.push(DepartmentSummary {
                department,
                meeting_count,
                request_count,
            });
        }
        Ok(summaries)
    }

    pub async fn department_detail(&self, department_id: i64) -> BookingResult<DepartmentDetail> {
        let department = self
            .store
            .get_department(department_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::Department, department_id))?;

        let meetings = self
            .store
            .list_meetings(&MeetingFilter {
                department_id: Some(department_id),
                ..Default::default()
            })
            .await?;
        let requests = self
            .store
            .list_booking_requests(&BookingRequestFilter {
                department_id: Some(department_id),
                ..Default::default()
            })
            .await?;
        let admins = self.store.list_department_members(department_id).await?;

        Ok(DepartmentDetail {
            department,
            meetings,
            requests,
            admins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::NewMeeting;
    use crate::store::InMemoryRecordStore;
    use chrono::TimeZone;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600).unwrap()
    }

    #[test]
    fn test_periods_follow_calendar() {
        // Wednesday 2025-12-31 10:00 local
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 5, 0, 0).unwrap();
        let (today, week, month) = periods(now, offset()).unwrap();

        assert_eq!(today.start, Utc.with_ymd_and_hms(2025, 12, 30, 19, 0, 0).unwrap());
        assert_eq!(week.start, Utc.with_ymd_and_hms(2025, 12, 28, 19, 0, 0).unwrap());
        assert_eq!(week.end - week.start, Duration::days(7));
        assert_eq!(month.start, Utc.with_ymd_and_hms(2025, 11, 30, 19, 0, 0).unwrap());
        assert_eq!(month.end, Utc.with_ymd_and_hms(2025, 12, 31, 19, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_meeting_stats_count_by_period() {
        let store = Arc::new(InMemoryRecordStore::new());
        let user = store.seed_user(1, "member", false).await;
        let finance = store.seed_department("Finance", 10).await;
        let legal = store.seed_department("Legal", 10).await;

        // Wednesday 2025-03-12 09:00 local
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 4, 0, 0).unwrap();
        for (department, days) in [(&finance, 0), (&finance, -1), (&legal, 10), (&legal, 40)] {
            store
                .insert_meeting(NewMeeting {
                    title: "Sync".to_string(),
                    description: String::new(),
                    department_id: department.id,
                    created_by: user.id,
                    start_time: now + Duration::days(days),
                    duration_minutes: 30,
                })
                .await;
        }

        let reporter = Reporter::new(store.clone(), Arc::new(FixedClock::new(now)), offset());
        let stats = reporter.meeting_stats().await.unwrap();
        assert_eq!(
            stats,
            MeetingStats {
                total: 4,
                today: 1,
                this_week: 2,
                this_month: 3,
            }
        );

        let summary = reporter.dashboard().await.unwrap();
        assert_eq!(summary.active_departments, 2);
        assert_eq!(summary.recent_meetings.len(), 4);
        assert_eq!(summary.department_counts[0].count, 2);
    }

    #[tokio::test]
    async fn test_unknown_department_detail() {
        let store = Arc::new(InMemoryRecordStore::new());
        let reporter = Reporter::new(store, Arc::new(FixedClock::new(Utc::now())), offset());
        assert!(matches!(
            reporter.department_detail(5).await,
            Err(BookingError::NotFound { .. })
        ));
    }
}
