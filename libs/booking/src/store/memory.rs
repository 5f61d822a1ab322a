//! In-memory record store
//!
//! All tables sit behind one async mutex, so every trait method, including
//! count-then-insert and promotion, runs as a single atomic unit. Used by the
//! test suites and for running the bot without PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use common::error::{DatabaseError, DatabaseResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{Admitted, Promotion, RecordStore};
use crate::admission::{AdmissionCheck, AdmissionCounts, CountScope};
use crate::models::{
    BookingRequest, BookingRequestFilter, BookingStatus, Department, DepartmentCount,
    DepartmentMembership, Meeting, MeetingFilter, MeetingStatus, MeetingUpdate,
    NewBookingRequest, NewMeeting, NewUser, RequestTransition, TimeWindow, User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    departments: Vec<Department>,
    memberships: Vec<DepartmentMembership>,
    /// Insertion order
    requests: Vec<BookingRequest>,
    meetings: Vec<Meeting>,
    next_department_id: i64,
}

impl Tables {
    fn count_meetings(&self, scope: CountScope, window: Option<&TimeWindow>) -> i64 {
        self.meetings
            .iter()
            .filter(|m| m.is_active && window.is_none_or(|w| w.contains(m.start_time)))
            .filter(|m| match scope {
                CountScope::All => true,
                CountScope::User(id) => m.created_by == id,
                CountScope::Department(id) => m.department_id == id,
            })
            .count() as i64
    }

    fn count_pending(&self, scope: CountScope, window: &TimeWindow) -> i64 {
        self.requests
            .iter()
            .filter(|r| r.status == BookingStatus::Pending)
            .filter(|r| window.contains(r.preferred_start_time))
            .filter(|r| match scope {
                CountScope::All => true,
                CountScope::User(id) => r.requested_by == id,
                CountScope::Department(id) => r.department_id == id,
            })
            .count() as i64
    }

    fn admission_counts(&self, check: &AdmissionCheck) -> AdmissionCounts {
        let user = CountScope::User(check.user_id);
        let department = CountScope::Department(check.department_id);
        let mut counts = AdmissionCounts {
            user: self.count_meetings(user, Some(&check.window)),
            department: self.count_meetings(department, Some(&check.window)),
        };
        if check.include_pending {
            counts.user += self.count_pending(user, &check.window);
            counts.department += self.count_pending(department, &check.window);
        }
        counts
    }

    fn insert_meeting(&mut self, new_meeting: &NewMeeting) -> Meeting {
        let now = Utc::now();
        let meeting = Meeting {
            id: Uuid::new_v4(),
            external_meeting_id: None,
            title: new_meeting.title.clone(),
            description: new_meeting.description.clone(),
            department_id: new_meeting.department_id,
            created_by: new_meeting.created_by,
            start_time: new_meeting.start_time,
            duration_minutes: new_meeting.duration_minutes,
            join_url: None,
            passcode: None,
            status: MeetingStatus::Scheduled,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.meetings.push(meeting.clone());
        meeting
    }
}

/// Record store kept entirely in process memory
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    read_only: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the database were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every subsequent write fail while reads keep working
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> DatabaseResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::Connection(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> DatabaseResult<()> {
        self.ensure_available()?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query(sqlx::Error::Protocol(
                "record store is read-only".to_string(),
            )));
        }
        Ok(())
    }

    pub async fn seed_user(&self, external_id: i64, username: &str, is_staff: bool) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            external_id,
            username: Some(username.to_string()),
            first_name: username.to_string(),
            last_name: String::new(),
            is_staff,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .await
            .users
            .insert(user.id, user.clone());
        user
    }

    pub async fn seed_department(&self, name: &str, daily_limit: i32) -> Department {
        let mut tables = self.tables.lock().await;
        tables.next_department_id += 1;
        let department = Department {
            id: tables.next_department_id,
            name: name.to_string(),
            description: String::new(),
            daily_limit,
            is_active: true,
            created_at: Utc::now(),
        };
        tables.departments.push(department.clone());
        department
    }

    pub async fn set_department_active(&self, department_id: i64, is_active: bool) {
        let mut tables = self.tables.lock().await;
        if let Some(d) = tables
            .departments
            .iter_mut()
            .find(|d| d.id == department_id)
        {
            d.is_active = is_active;
        }
    }

    pub async fn add_membership(&self, user_id: Uuid, department_id: i64) {
        self.tables
            .lock()
            .await
            .memberships
            .push(DepartmentMembership {
                user_id,
                department_id,
                is_active: true,
                created_at: Utc::now(),
            });
    }

    /// Insert a meeting without any admission check
    pub async fn insert_meeting(&self, new_meeting: NewMeeting) -> Meeting {
        self.tables.lock().await.insert_meeting(&new_meeting)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_user(&self, external_id: i64) -> DatabaseResult<Option<User>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn get_user(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        self.ensure_available()?;
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn create_user(&self, new_user: &NewUser) -> DatabaseResult<User> {
        self.ensure_writable()?;
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .users
            .values()
            .find(|u| u.external_id == new_user.external_id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            external_id: new_user.external_id,
            username: new_user.username.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            is_staff: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        debug!("Created user {} for external id {}", user.id, user.external_id);
        Ok(user)
    }

    async fn list_active_departments(&self) -> DatabaseResult<Vec<Department>> {
        self.ensure_available()?;
        let mut departments: Vec<Department> = self
            .tables
            .lock()
            .await
            .departments
            .iter()
            .filter(|d| d.is_active)
            .cloned()
            .collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn list_departments(&self) -> DatabaseResult<Vec<Department>> {
        self.ensure_available()?;
        let mut departments = self.tables.lock().await.departments.clone();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn get_department(&self, id: i64) -> DatabaseResult<Option<Department>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.departments.iter().find(|d| d.id == id).cloned())
    }

    async fn list_user_departments(&self, user_id: Uuid) -> DatabaseResult<Vec<Department>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        let mut departments: Vec<Department> = tables
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter_map(|m| {
                tables
                    .departments
                    .iter()
                    .find(|d| d.id == m.department_id && d.is_active)
            })
            .cloned()
            .collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        departments.dedup_by_key(|d| d.id);
        Ok(departments)
    }

    async fn list_department_members(
        &self,
        department_id: i64,
    ) -> DatabaseResult<Vec<DepartmentMembership>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .memberships
            .iter()
            .filter(|m| m.department_id == department_id && m.is_active)
            .cloned()
            .collect())
    }

    async fn count_active_meetings(
        &self,
        scope: CountScope,
        window: Option<&TimeWindow>,
    ) -> DatabaseResult<i64> {
        self.ensure_available()?;
        Ok(self.tables.lock().await.count_meetings(scope, window))
    }

    async fn count_booking_requests(&self, filter: &BookingRequestFilter) -> DatabaseResult<i64> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.requests.iter().filter(|r| filter.matches(r)).count() as i64)
    }

    async fn admission_counts(&self, check: &AdmissionCheck) -> DatabaseResult<AdmissionCounts> {
        self.ensure_available()?;
        Ok(self.tables.lock().await.admission_counts(check))
    }

    async fn create_booking_request(
        &self,
        new_request: &NewBookingRequest,
        admission: &AdmissionCheck,
    ) -> DatabaseResult<Admitted<BookingRequest>> {
        self.ensure_writable()?;
        let mut tables = self.tables.lock().await;

        if let Err(denied) = admission.evaluate(tables.admission_counts(admission)) {
            return Ok(Err(denied));
        }

        let now = Utc::now();
        let request = BookingRequest {
            id: Uuid::new_v4(),
            department_id: new_request.department_id,
            requested_by: new_request.requested_by,
            title: new_request.title.clone(),
            description: new_request.description.clone(),
            preferred_start_time: new_request.preferred_start_time,
            duration_minutes: new_request.duration_minutes,
            status: BookingStatus::Pending,
            rejection_reason: None,
            processed_by: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.requests.push(request.clone());
        Ok(Ok(request))
    }

    async fn get_booking_request(&self, id: Uuid) -> DatabaseResult<Option<BookingRequest>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn update_booking_request(
        &self,
        id: Uuid,
        expected: BookingStatus,
        transition: &RequestTransition,
    ) -> DatabaseResult<Option<BookingRequest>> {
        self.ensure_writable()?;
        let mut tables = self.tables.lock().await;
        match tables
            .requests
            .iter_mut()
            .find(|r| r.id == id && r.status == expected)
        {
            Some(request) => {
                transition.apply_to(request);
                Ok(Some(request.clone()))
            }
            None => Ok(None),
        }
    }

    async fn promote_booking_request(
        &self,
        id: Uuid,
        transition: &RequestTransition,
        admission: &AdmissionCheck,
    ) -> DatabaseResult<Promotion> {
        self.ensure_writable()?;
        let mut tables = self.tables.lock().await;

        let Some(index) = tables.requests.iter().position(|r| r.id == id) else {
            return Ok(Promotion::NotFound);
        };
        let status = tables.requests[index].status;
        if status != BookingStatus::Pending {
            return Ok(Promotion::AlreadyProcessed(status));
        }

        if let Err(denied) = admission.evaluate(tables.admission_counts(admission)) {
            return Ok(Promotion::Denied(denied));
        }

        let request = {
            let request = &mut tables.requests[index];
            transition.apply_to(request);
            request.clone()
        };
        let meeting = tables.insert_meeting(&NewMeeting {
            title: request.title.clone(),
            description: request.description.clone(),
            department_id: request.department_id,
            created_by: request.requested_by,
            start_time: request.preferred_start_time,
            duration_minutes: request.duration_minutes,
        });

        Ok(Promotion::Promoted { request, meeting })
    }

    async fn list_booking_requests(
        &self,
        filter: &BookingRequestFilter,
    ) -> DatabaseResult<Vec<BookingRequest>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(tables
            .requests
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_meeting(
        &self,
        new_meeting: &NewMeeting,
        admission: &AdmissionCheck,
    ) -> DatabaseResult<Admitted<Meeting>> {
        self.ensure_writable()?;
        let mut tables = self.tables.lock().await;

        if let Err(denied) = admission.evaluate(tables.admission_counts(admission)) {
            return Ok(Err(denied));
        }

        Ok(Ok(tables.insert_meeting(new_meeting)))
    }

    async fn get_meeting(&self, id: Uuid) -> DatabaseResult<Option<Meeting>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.meetings.iter().find(|m| m.id == id).cloned())
    }

    async fn update_meeting(
        &self,
        id: Uuid,
        update: &MeetingUpdate,
    ) -> DatabaseResult<Option<Meeting>> {
        self.ensure_writable()?;
        let mut tables = self.tables.lock().await;
        match tables.meetings.iter_mut().find(|m| m.id == id) {
            Some(meeting) => {
                update.apply_to(meeting, Utc::now());
                Ok(Some(meeting.clone()))
            }
            None => Ok(None),
        }
    }

    async fn list_meetings(&self, filter: &MeetingFilter) -> DatabaseResult<Vec<Meeting>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        let mut meetings: Vec<Meeting> = tables
            .meetings
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        if filter.ascending {
            meetings.sort_by_key(|m| m.start_time);
        } else {
            meetings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        }
        if let Some(limit) = filter.limit {
            meetings.truncate(limit.max(0) as usize);
        }
        Ok(meetings)
    }

    async fn meeting_counts_by_department(&self) -> DatabaseResult<Vec<DepartmentCount>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        let mut counts: Vec<DepartmentCount> = tables
            .departments
            .iter()
            .map(|d| DepartmentCount {
                department_id: d.id,
                department_name: d.name.clone(),
                count: tables
                    .meetings
                    .iter()
                    .filter(|m| m.is_active && m.department_id == d.id)
                    .count() as i64,
            })
            .filter(|c| c.count > 0)
            .collect();
        counts.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.department_name.cmp(&b.department_name))
        });
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn check(user_id: Uuid, department_id: i64, include_pending: bool) -> AdmissionCheck {
        AdmissionCheck {
            user_id,
            department_id,
            window: TimeWindow::new(start() - Duration::hours(9), start() + Duration::hours(15)),
            day: start().date_naive(),
            user_ceiling: 2,
            department_limit: 10,
            include_pending,
        }
    }

    fn new_request(user_id: Uuid, department_id: i64) -> NewBookingRequest {
        NewBookingRequest {
            department_id,
            requested_by: user_id,
            title: "Planning".to_string(),
            description: String::new(),
            preferred_start_time: start(),
            duration_minutes: 60,
        }
    }

    #[tokio::test]
    async fn test_create_user_is_idempotent_per_external_id() {
        let store = InMemoryRecordStore::new();
        let new_user = NewUser {
            external_id: 77,
            username: None,
            first_name: "Bobur".to_string(),
            last_name: String::new(),
        };
        let first = store.create_user(&new_user).await.unwrap();
        let second = store.create_user(&new_user).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_pending_requests_hold_admission_slots() {
        let store = InMemoryRecordStore::new();
        let user = store.seed_user(1, "member", false).await;
        let department = store.seed_department("Sales", 10).await;

        for _ in 0..2 {
            let created = store
                .create_booking_request(
                    &new_request(user.id, department.id),
                    &check(user.id, department.id, true),
                )
                .await
                .unwrap();
            assert!(created.is_ok());
        }

        let denied = store
            .create_booking_request(
                &new_request(user.id, department.id),
                &check(user.id, department.id, true),
            )
            .await
            .unwrap();
        assert!(denied.is_err());
        assert_eq!(
            store
                .count_booking_requests(&BookingRequestFilter::default())
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_conditional_update_requires_expected_status() {
        let store = InMemoryRecordStore::new();
        let user = store.seed_user(1, "member", false).await;
        let department = store.seed_department("Sales", 10).await;
        let request = store
            .create_booking_request(
                &new_request(user.id, department.id),
                &check(user.id, department.id, true),
            )
            .await
            .unwrap()
            .unwrap();

        let transition = RequestTransition::reject(user.id, None, start());
        let first = store
            .update_booking_request(request.id, BookingStatus::Pending, &transition)
            .await
            .unwrap();
        assert_eq!(first.map(|r| r.status), Some(BookingStatus::Rejected));

        let second = store
            .update_booking_request(request.id, BookingStatus::Pending, &transition)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryRecordStore::new();
        store.set_unavailable(true);
        let err = store.list_active_departments().await.unwrap_err();
        assert!(matches!(err, DatabaseError::Connection(_)));
    }

    #[tokio::test]
    async fn test_requests_are_listed_newest_first() {
        let store = InMemoryRecordStore::new();
        let user = store.seed_user(1, "member", false).await;
        let department = store.seed_department("Sales", 10).await;
        let mut generous = check(user.id, department.id, true);
        generous.user_ceiling = 10;

        let mut ids = Vec::new();
        for title in ["first", "second", "third"] {
            let mut new = new_request(user.id, department.id);
            new.title = title.to_string();
            let created = store
                .create_booking_request(&new, &generous)
                .await
                .unwrap()
                .unwrap();
            ids.push(created.id);
        }

        let listed = store
            .list_booking_requests(&BookingRequestFilter {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        let titles: Vec<&str> = listed.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second"]);
    }
}
