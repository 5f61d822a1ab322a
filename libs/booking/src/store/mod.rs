//! Record store seam
//!
//! Durable storage for users, departments, booking requests and meetings is
//! an external collaborator. The booking core talks to it only through
//! [`RecordStore`]. Operations that must be race-free (admission-checked
//! inserts, conditional status updates, promotion) are single trait methods
//! so each backend can run them as one atomic unit.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use common::error::DatabaseResult;
use std::sync::Arc;
use uuid::Uuid;

use crate::admission::{AdmissionCheck, AdmissionCounts, AdmissionDenied, CountScope};
use crate::models::{
    BookingRequest, BookingRequestFilter, BookingStatus, Department, DepartmentCount,
    DepartmentMembership, Meeting, MeetingFilter, MeetingUpdate, NewBookingRequest, NewMeeting,
    NewUser, RequestTransition, TimeWindow, User,
};

pub use memory::InMemoryRecordStore;
pub use postgres::PgRecordStore;

/// Outcome of an admission-checked insert
pub type Admitted<T> = Result<T, AdmissionDenied>;

/// Outcome of promoting a pending request into a meeting
#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    Promoted {
        request: BookingRequest,
        meeting: Meeting,
    },
    NotFound,
    AlreadyProcessed(BookingStatus),
    Denied(AdmissionDenied),
}

/// Shared handle to a record store
pub type SharedStore = Arc<dyn RecordStore>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_user(&self, external_id: i64) -> DatabaseResult<Option<User>>;

    async fn get_user(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    /// Create a user, or return the existing one with the same external id
    async fn create_user(&self, new_user: &NewUser) -> DatabaseResult<User>;

    async fn list_active_departments(&self) -> DatabaseResult<Vec<Department>>;

    async fn list_departments(&self) -> DatabaseResult<Vec<Department>>;

    async fn get_department(&self, id: i64) -> DatabaseResult<Option<Department>>;

    /// Active departments the user holds an active membership in
    async fn list_user_departments(&self, user_id: Uuid) -> DatabaseResult<Vec<Department>>;

    /// Active memberships of a department
    async fn list_department_members(
        &self,
        department_id: i64,
    ) -> DatabaseResult<Vec<DepartmentMembership>>;

    /// Active meetings whose start time falls within `window`, or all of them
    async fn count_active_meetings(
        &self,
        scope: CountScope,
        window: Option<&TimeWindow>,
    ) -> DatabaseResult<i64>;

    async fn count_booking_requests(&self, filter: &BookingRequestFilter) -> DatabaseResult<i64>;

    /// Consistent snapshot of both cap counters for `check`
    async fn admission_counts(&self, check: &AdmissionCheck) -> DatabaseResult<AdmissionCounts>;

    /// Insert a pending request if `admission` passes, atomically
    async fn create_booking_request(
        &self,
        new_request: &NewBookingRequest,
        admission: &AdmissionCheck,
    ) -> DatabaseResult<Admitted<BookingRequest>>;

    async fn get_booking_request(&self, id: Uuid) -> DatabaseResult<Option<BookingRequest>>;

    /// Apply `transition` only if the request is currently in `expected`
    ///
    /// Returns `None` when the request is absent or in another status.
    async fn update_booking_request(
        &self,
        id: Uuid,
        expected: BookingStatus,
        transition: &RequestTransition,
    ) -> DatabaseResult<Option<BookingRequest>>;

    /// Approve a pending request and create its meeting in one atomic unit
    async fn promote_booking_request(
        &self,
        id: Uuid,
        transition: &RequestTransition,
        admission: &AdmissionCheck,
    ) -> DatabaseResult<Promotion>;

    async fn list_booking_requests(
        &self,
        filter: &BookingRequestFilter,
    ) -> DatabaseResult<Vec<BookingRequest>>;

    /// Insert a scheduled meeting if `admission` passes, atomically
    async fn create_meeting(
        &self,
        new_meeting: &NewMeeting,
        admission: &AdmissionCheck,
    ) -> DatabaseResult<Admitted<Meeting>>;

    async fn get_meeting(&self, id: Uuid) -> DatabaseResult<Option<Meeting>>;

    async fn update_meeting(&self, id: Uuid, update: &MeetingUpdate)
    -> DatabaseResult<Option<Meeting>>;

    async fn list_meetings(&self, filter: &MeetingFilter) -> DatabaseResult<Vec<Meeting>>;

    /// Active meeting counts per department, largest first
    async fn meeting_counts_by_department(&self) -> DatabaseResult<Vec<DepartmentCount>>;
}
