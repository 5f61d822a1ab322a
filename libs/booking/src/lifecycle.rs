//! Booking request and meeting lifecycle
//!
//! Every mutation of a [`BookingRequest`] or [`Meeting`] goes through
//! [`LifecycleManager`]. A request only ever moves out of `pending`; the
//! move is a conditional update in the record store, so two reviewers acting
//! on the same request cannot both win.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admission::{AdmissionController, AdmissionPolicy};
use crate::clock::Clock;
use crate::error::{BookingError, BookingResult, Entity};
use crate::intake::BookingDraft;
use crate::models::{
    BookingRequest, BookingRequestFilter, BookingStatus, Department, Meeting, MeetingFilter,
    MeetingStatus, MeetingUpdate, NewBookingRequest, NewMeeting, RequestTransition, User,
};
use crate::store::{Promotion, SharedStore};
use crate::validation::{self, ValidationError};

/// Owns request and meeting state transitions
#[derive(Clone)]
pub struct LifecycleManager {
    store: SharedStore,
    admission: AdmissionController,
    clock: Arc<dyn Clock>,
}

impl LifecycleManager {
    pub fn new(store: SharedStore, policy: AdmissionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            admission: AdmissionController::new(store.clone(), policy),
            store,
            clock,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        self.admission.policy()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Create a pending request from a completed intake
    pub async fn submit(&self, draft: &BookingDraft) -> BookingResult<BookingRequest> {
        let title = self.revalidate(draft)?;
        let department = self.bookable_department(draft.user_id, draft.department_id).await?;

        let check = self
            .admission
            .request_check(draft.user_id, &department, draft.start_time);
        let new_request = NewBookingRequest {
            department_id: department.id,
            requested_by: draft.user_id,
            title,
            description: draft.description.clone(),
            preferred_start_time: draft.start_time,
            duration_minutes: draft.duration_minutes,
        };

        match self.store.create_booking_request(&new_request, &check).await? {
            Ok(request) => {
                info!(
                    "Booking request {} submitted by user {} for department {}",
                    request.id, request.requested_by, request.department_id
                );
                Ok(request)
            }
            Err(denied) => {
                info!("Booking request by user {} denied: {}", draft.user_id, denied);
                Err(denied.into())
            }
        }
    }

    /// Create a scheduled meeting directly, without review
    pub async fn schedule_direct(&self, draft: &BookingDraft) -> BookingResult<Meeting> {
        let title = self.revalidate(draft)?;
        let department = self.bookable_department(draft.user_id, draft.department_id).await?;

        let check = self
            .admission
            .meeting_check(draft.user_id, &department, draft.start_time);
        let new_meeting = NewMeeting {
            title,
            description: draft.description.clone(),
            department_id: department.id,
            created_by: draft.user_id,
            start_time: draft.start_time,
            duration_minutes: draft.duration_minutes,
        };

        match self.store.create_meeting(&new_meeting, &check).await? {
            Ok(meeting) => {
                info!(
                    "Meeting {} scheduled directly by user {}",
                    meeting.id, meeting.created_by
                );
                Ok(meeting)
            }
            Err(denied) => {
                info!("Direct scheduling by user {} denied: {}", draft.user_id, denied);
                Err(denied.into())
            }
        }
    }

    /// Approve a pending request and promote it into a scheduled meeting
    pub async fn approve(&self, request_id: Uuid, reviewer_id: Uuid) -> BookingResult<Meeting> {
        let reviewer = self.require_staff(reviewer_id).await?;
        let request = self.require_request(request_id).await?;
        if request.status.is_terminal() {
            return Err(BookingError::AlreadyProcessed {
                id: request.id,
                status: request.status,
            });
        }

        let department = self
            .store
            .get_department(request.department_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::Department, request.department_id))?;
        let check = self.admission.meeting_check(
            request.requested_by,
            &department,
            request.preferred_start_time,
        );
        let transition = RequestTransition::approve(reviewer.id, self.clock.now());

        match self
            .store
            .promote_booking_request(request_id, &transition, &check)
            .await?
        {
            Promotion::Promoted { request, meeting } => {
                info!(
                    "Booking request {} approved by {}; meeting {} scheduled",
                    request.id, reviewer.id, meeting.id
                );
                Ok(meeting)
            }
            Promotion::NotFound => Err(BookingError::not_found(Entity::BookingRequest, request_id)),
            Promotion::AlreadyProcessed(status) => {
                info!(
                    "Approval of booking request {} by {} lost the race: already {}",
                    request_id, reviewer.id, status
                );
                Err(BookingError::AlreadyProcessed {
                    id: request_id,
                    status,
                })
            }
            Promotion::Denied(denied) => {
                warn!("Approval of booking request {} denied: {}", request_id, denied);
                Err(denied.into())
            }
        }
    }

    /// Reject a pending request; no meeting is created
    pub async fn reject(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        reason: Option<String>,
    ) -> BookingResult<BookingRequest> {
        let reviewer = self.require_staff(reviewer_id).await?;
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let transition = RequestTransition::reject(reviewer.id, reason, self.clock.now());

        let request = self.transition_pending(request_id, &transition).await?;
        info!("Booking request {} rejected by {}", request.id, reviewer.id);
        Ok(request)
    }

    /// Withdraw a pending request; allowed for the requester or staff
    pub async fn cancel_request(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
    ) -> BookingResult<BookingRequest> {
        let actor = self.require_user(actor_id).await?;
        let request = self.require_request(request_id).await?;
        if request.requested_by != actor.id && !actor.is_staff {
            return Err(BookingError::Forbidden(actor.id));
        }

        let transition = RequestTransition::cancel(actor.id, self.clock.now());
        let request = self.transition_pending(request_id, &transition).await?;
        info!("Booking request {} cancelled by {}", request.id, actor.id);
        Ok(request)
    }

    /// Mark a meeting cancelled; `is_active` is left untouched
    pub async fn cancel_meeting(&self, meeting_id: Uuid, actor_id: Uuid) -> BookingResult<Meeting> {
        self.set_meeting_status(meeting_id, actor_id, MeetingStatus::Cancelled)
            .await
    }

    pub async fn activate_meeting(&self, meeting_id: Uuid, actor_id: Uuid) -> BookingResult<Meeting> {
        self.set_meeting_status(meeting_id, actor_id, MeetingStatus::Active)
            .await
    }

    /// Attach provisioning details (join URL, passcode, external id) to an active meeting
    pub async fn update_meeting(
        &self,
        meeting_id: Uuid,
        update: &MeetingUpdate,
    ) -> BookingResult<Meeting> {
        self.get_meeting(meeting_id).await?;

        self.store
            .update_meeting(meeting_id, update)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::Meeting, meeting_id))
    }

    pub async fn get_request(&self, request_id: Uuid) -> BookingResult<BookingRequest> {
        self.require_request(request_id).await
    }

    /// Active meeting by id; soft-deleted meetings are reported as missing
    pub async fn get_meeting(&self, meeting_id: Uuid) -> BookingResult<Meeting> {
        self.store
            .get_meeting(meeting_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| BookingError::not_found(Entity::Meeting, meeting_id))
    }

    pub async fn list_requests(
        &self,
        filter: &BookingRequestFilter,
    ) -> BookingResult<Vec<BookingRequest>> {
        Ok(self.store.list_booking_requests(filter).await?)
    }

    pub async fn list_meetings(&self, filter: &MeetingFilter) -> BookingResult<Vec<Meeting>> {
        Ok(self.store.list_meetings(filter).await?)
    }

    pub async fn require_user(&self, user_id: Uuid) -> BookingResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::User, user_id))
    }

    /// Active staff user, or `Forbidden`
    pub async fn require_staff(&self, user_id: Uuid) -> BookingResult<User> {
        let user = self.require_user(user_id).await?;
        if !user.is_staff || !user.is_active {
            warn!("User {} attempted a staff-only action", user_id);
            return Err(BookingError::Forbidden(user_id));
        }
        Ok(user)
    }

    async fn require_request(&self, request_id: Uuid) -> BookingResult<BookingRequest> {
        self.store
            .get_booking_request(request_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::BookingRequest, request_id))
    }

    /// Department the user may book for: active and with an active membership
    async fn bookable_department(&self, user_id: Uuid, department_id: i64) -> BookingResult<Department> {
        let memberships = self.store.list_user_departments(user_id).await?;
        memberships
            .into_iter()
            .find(|d| d.id == department_id && d.is_active)
            .ok_or_else(|| ValidationError::DepartmentUnavailable(department_id.to_string()).into())
    }

    /// Check the draft again before anything is written; returns the normalized title
    fn revalidate(&self, draft: &BookingDraft) -> Result<String, ValidationError> {
        let title = validation::validate_title(&draft.title)?;
        validation::ensure_future(draft.start_time, self.clock.now())?;
        validation::ensure_duration(i64::from(draft.duration_minutes))?;
        Ok(title)
    }

    /// Apply a transition out of `pending`, telling a lost race from a missing record
    async fn transition_pending(
        &self,
        request_id: Uuid,
        transition: &RequestTransition,
    ) -> BookingResult<BookingRequest> {
        if let Some(request) = self
            .store
            .update_booking_request(request_id, BookingStatus::Pending, transition)
            .await?
        {
            return Ok(request);
        }

        match self.store.get_booking_request(request_id).await? {
            Some(current) => Err(BookingError::AlreadyProcessed {
                id: request_id,
                status: current.status,
            }),
            None => Err(BookingError::not_found(Entity::BookingRequest, request_id)),
        }
    }

    async fn set_meeting_status(
        &self,
        meeting_id: Uuid,
        actor_id: Uuid,
        status: MeetingStatus,
    ) -> BookingResult<Meeting> {
        let actor = self.require_staff(actor_id).await?;
        self.get_meeting(meeting_id).await?;

        let meeting = self
            .store
            .update_meeting(meeting_id, &MeetingUpdate::status(status))
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::Meeting, meeting_id))?;
        info!("Meeting {} set to {} by {}", meeting.id, status, actor.id);
        Ok(meeting)
    }
}
