//! Routes inbound chat events to the intake machine or to direct operations

use chrono::{DateTime, Utc};
use common::error::DatabaseError;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Command, Event, Inbound, Menu, Outbound, ReviewAction, SenderProfile};
use crate::admission::{AdmissionDenied, CapScope};
use crate::error::BookingError;
use crate::intake::{
    BookingDraft, DepartmentOption, IntakeInput, IntakeSession, IntakeStage, SharedSessionStore,
    Step,
};
use crate::lifecycle::LifecycleManager;
use crate::models::{
    BookingRequestFilter, BookingStatus, Meeting, MeetingFilter, NewUser, User,
};
use crate::validation::{Field, ValidationError};

const RECENT_REQUESTS: i64 = 5;
const PENDING_PAGE: i64 = 10;

const STAFF_ONLY: &str = "This section is available to staff only.";
const RETRY: &str = "Something went wrong on our side. Please try again in a moment.";

#[derive(Debug, Error)]
pub enum DialogError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("Session store error: {0:#}")]
    Session(anyhow::Error),
}

impl From<anyhow::Error> for DialogError {
    fn from(err: anyhow::Error) -> Self {
        DialogError::Session(err)
    }
}

impl From<DatabaseError> for DialogError {
    fn from(err: DatabaseError) -> Self {
        DialogError::Booking(BookingError::Store(err))
    }
}

pub type DialogResult<T> = Result<T, DialogError>;

/// How a completed intake was recorded
enum Completion {
    Requested(crate::models::BookingRequest),
    Scheduled(Meeting),
}

pub struct Dispatcher {
    lifecycle: LifecycleManager,
    sessions: SharedSessionStore,
    /// Schedule completed intakes directly instead of queueing them for review
    auto_schedule: bool,
}

impl Dispatcher {
    pub fn new(lifecycle: LifecycleManager, sessions: SharedSessionStore, auto_schedule: bool) -> Self {
        Self {
            lifecycle,
            sessions,
            auto_schedule,
        }
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn sessions(&self) -> &SharedSessionStore {
        &self.sessions
    }

    /// Handle one inbound event; failures become a user-facing reply
    pub async fn handle(&self, inbound: &Inbound) -> Outbound {
        let conversation_id = inbound.conversation_id;
        let user = match self.resolve_user(&inbound.sender).await {
            Ok(user) => user,
            Err(err) => {
                return self.failure_reply(conversation_id, err, Menu::Main { staff: false });
            }
        };

        let result = match &inbound.event {
            Event::Text(text) => self.handle_inbound_text(conversation_id, &user, text).await,
            Event::Command(command) => {
                self.handle_command(conversation_id, &user, *command)
                    .await
            }
        };

        result.unwrap_or_else(|err| {
            self.failure_reply(conversation_id, err, failure_menu(&user, &inbound.event))
        })
    }

    /// Free text goes to the running intake, if any
    pub async fn handle_inbound_text(
        &self,
        conversation_id: i64,
        user: &User,
        text: &str,
    ) -> DialogResult<Outbound> {
        let now = self.lifecycle.clock().now();
        match self.sessions.load(conversation_id, now).await? {
            Some(session) => self.advance_session(session, IntakeInput::Text(text)).await,
            None => Ok(Outbound::text("I did not understand that. Please use the menu below.")
                .with_menu(main_menu(user))),
        }
    }

    pub async fn handle_command(
        &self,
        conversation_id: i64,
        user: &User,
        command: Command,
    ) -> DialogResult<Outbound> {
        if command.is_staff_only() && !user.is_staff {
            warn!("User {} issued staff command {:?}", user.id, command);
            return Ok(Outbound::text(STAFF_ONLY).with_menu(main_menu(user)));
        }

        match command {
            Command::Start => {
                self.sessions.remove(conversation_id).await?;
                Ok(Outbound::text(format!(
                    "Welcome, {}!\n\nI help you book online meetings for your department. \
                     Choose an action from the menu below.",
                    user.display_name()
                ))
                .with_menu(main_menu(user)))
            }
            Command::Help => Ok(Outbound::text(HELP).with_menu(main_menu(user))),
            Command::Profile => self.profile(user).await,
            Command::Book => self.begin_booking(conversation_id, user).await,
            Command::MyMeetings => self.my_meetings(user).await,
            Command::MyRequests => self.my_requests(user).await,
            Command::Admin => Ok(Outbound::text("Administration").with_menu(Menu::Admin)),
            Command::Back => {
                self.sessions.remove(conversation_id).await?;
                Ok(Outbound::text("Main menu").with_menu(main_menu(user)))
            }
            Command::Cancel => {
                let now = self.lifecycle.clock().now();
                let text = match self.sessions.load(conversation_id, now).await? {
                    Some(_) => {
                        self.sessions.remove(conversation_id).await?;
                        info!("Intake cancelled in conversation {}", conversation_id);
                        "Booking cancelled."
                    }
                    None => "There is nothing to cancel.",
                };
                Ok(Outbound::text(text).with_menu(main_menu(user)))
            }
            Command::SelectDepartment(department_id) => {
                let now = self.lifecycle.clock().now();
                match self.sessions.load(conversation_id, now).await? {
                    Some(session) => {
                        self.advance_session(session, IntakeInput::Department(department_id))
                            .await
                    }
                    None => Ok(Outbound::text(
                        "No booking is in progress. Choose \"Book a meeting\" to start.",
                    )
                    .with_menu(main_menu(user))),
                }
            }
            Command::PendingRequests => self.pending_requests().await,
            Command::Review { request_id, action } => Ok(self
                .handle_review_action(request_id, user.id, action, None)
                .await?),
        }
    }

    /// Apply a reviewer's decision and notify the requester
    pub async fn handle_review_action(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        action: ReviewAction,
        reason: Option<String>,
    ) -> Result<Outbound, BookingError> {
        match action {
            ReviewAction::Approve => {
                let meeting = self.lifecycle.approve(request_id, reviewer_id).await?;
                let when = self.format_time(meeting.start_time);
                let reply = Outbound::text(format!(
                    "✅ Approved. Meeting \"{}\" is scheduled for {}.",
                    meeting.title, when
                ))
                .with_menu(Menu::Admin);

                Ok(match self.requester_external_id(meeting.created_by).await {
                    Some(external_id) => reply.with_notice(
                        external_id,
                        format!(
                            "✅ Your meeting \"{}\" on {} was approved.",
                            meeting.title, when
                        ),
                    ),
                    None => reply,
                })
            }
            ReviewAction::Reject => {
                let request = self
                    .lifecycle
                    .reject(request_id, reviewer_id, reason)
                    .await?;
                let when = self.format_time(request.preferred_start_time);
                let reply = Outbound::text(format!("❌ Rejected request \"{}\".", request.title))
                    .with_menu(Menu::Admin);

                let mut notice = format!(
                    "❌ Your meeting request \"{}\" on {} was rejected.",
                    request.title, when
                );
                if let Some(reason) = &request.rejection_reason {
                    notice.push_str(&format!("\nReason: {}", reason));
                }
                Ok(match self.requester_external_id(request.requested_by).await {
                    Some(external_id) => reply.with_notice(external_id, notice),
                    None => reply,
                })
            }
        }
    }

    /// Lookup-or-create the chat user
    async fn resolve_user(&self, sender: &SenderProfile) -> DialogResult<User> {
        let store = self.lifecycle.store();
        if let Some(user) = store.find_user(sender.external_id).await? {
            return Ok(user);
        }
        let user = store.create_user(&NewUser::from(sender)).await?;
        info!(
            "Registered user {} for external id {}",
            user.id, user.external_id
        );
        Ok(user)
    }

    async fn begin_booking(&self, conversation_id: i64, user: &User) -> DialogResult<Outbound> {
        // Book during an intake starts over
        self.sessions.remove(conversation_id).await?;

        let now = self.lifecycle.clock().now();
        if !self.lifecycle.admission().can_create(user.id, now).await? {
            return Ok(Outbound::text(format!(
                "You have reached the daily limit of {} meetings for today.",
                self.lifecycle.policy().user_daily_ceiling
            ))
            .with_menu(main_menu(user)));
        }

        let departments = self.lifecycle.store().list_user_departments(user.id).await?;
        if departments.is_empty() {
            return Ok(Outbound::text(
                "You are not assigned to any department yet. Ask an administrator to add you.",
            )
            .with_menu(main_menu(user)));
        }

        let session = IntakeSession::start(
            conversation_id,
            user.id,
            departments.iter().map(DepartmentOption::from).collect(),
            now,
        );
        self.sessions.save(&session).await?;
        info!(
            "Intake started in conversation {} by user {}",
            conversation_id, user.id
        );
        Ok(stage_reply(&session, None))
    }

    async fn advance_session(
        &self,
        mut session: IntakeSession,
        input: IntakeInput<'_>,
    ) -> DialogResult<Outbound> {
        let now = self.lifecycle.clock().now();
        let offset = self.lifecycle.policy().reference_offset;

        match session.advance(input, now, offset) {
            Step::Ignored => Ok(stage_reply(&session, None)),
            Step::Rejected(err) => {
                self.sessions.save(&session).await?;
                Ok(stage_reply(&session, Some(&err)))
            }
            Step::Advanced(_) => {
                self.sessions.save(&session).await?;
                Ok(stage_reply(&session, None))
            }
            Step::Completed(draft) => self.complete(session, draft).await,
        }
    }

    async fn complete(&self, mut session: IntakeSession, draft: BookingDraft) -> DialogResult<Outbound> {
        let conversation_id = session.conversation_id;
        // Drop the session before committing so a resent description
        // cannot record the booking twice; failure paths save it back.
        self.sessions.remove(conversation_id).await?;

        let outcome = if self.auto_schedule {
            self.lifecycle
                .schedule_direct(&draft)
                .await
                .map(Completion::Scheduled)
        } else {
            self.lifecycle.submit(&draft).await.map(Completion::Requested)
        };

        match outcome {
            Ok(completion) => {
                // Committed already, so a failed lookup only costs the staff button
                let staff = match self.lifecycle.require_user(draft.user_id).await {
                    Ok(user) => user.is_staff,
                    Err(err) => {
                        warn!("Could not reload user {} after booking: {}", draft.user_id, err);
                        false
                    }
                };
                let text = match completion {
                    Completion::Requested(request) => format!(
                        "📨 Your request \"{}\" for {} ({} min) was sent for review.",
                        request.title,
                        self.format_time(request.preferred_start_time),
                        request.duration_minutes
                    ),
                    Completion::Scheduled(meeting) => format!(
                        "✅ Meeting \"{}\" is scheduled for {} to {}.",
                        meeting.title,
                        self.format_time(meeting.start_time),
                        self.format_clock(meeting.end_time())
                    ),
                };
                Ok(Outbound::text(text).with_menu(Menu::Main { staff }))
            }
            Err(BookingError::Validation(err)) => {
                session.rewind_to(err.field());
                self.sessions.save(&session).await?;
                Ok(stage_reply(&session, Some(&err)))
            }
            Err(BookingError::Store(err)) => {
                error!(
                    "Could not record booking for conversation {}: {}",
                    conversation_id, err
                );
                session.rewind_to(Field::Description);
                self.sessions.save(&session).await?;
                Ok(Outbound::text(
                    "Your booking could not be saved right now. Send the description again to retry.",
                )
                .with_menu(Menu::Intake))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn profile(&self, user: &User) -> DialogResult<Outbound> {
        let now = self.lifecycle.clock().now();
        let departments = self.lifecycle.store().list_user_departments(user.id).await?;
        let today = self.lifecycle.admission().meetings_on_day(user.id, now).await?;

        let departments = if departments.is_empty() {
            "none".to_string()
        } else {
            departments
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let text = format!(
            "👤 Profile\n\nName: {} {}\nID: {}\nUsername: {}\nRole: {}\nDepartments: {}\nMeetings today: {}/{}",
            user.first_name,
            user.last_name,
            user.external_id,
            user.username
                .as_deref()
                .map(|u| format!("@{}", u))
                .unwrap_or_else(|| "-".to_string()),
            if user.is_staff { "staff" } else { "member" },
            departments,
            today,
            self.lifecycle.policy().user_daily_ceiling
        );
        Ok(Outbound::text(text).with_menu(main_menu(user)))
    }

    async fn my_meetings(&self, user: &User) -> DialogResult<Outbound> {
        let now = self.lifecycle.clock().now();
        let meetings = self
            .lifecycle
            .list_meetings(&MeetingFilter {
                created_by: Some(user.id),
                starts_within: Some(self.lifecycle.policy().day_window(now)),
                ascending: true,
                ..Default::default()
            })
            .await?;

        if meetings.is_empty() {
            return Ok(Outbound::text("You have no meetings today.").with_menu(main_menu(user)));
        }

        let names = self.department_names().await?;
        let mut text = String::from("📅 Your meetings today:\n");
        for meeting in &meetings {
            text.push_str(&format!(
                "\n• {}\n  {}-{} · {}\n  {}\n",
                meeting.title,
                self.format_clock(meeting.start_time),
                self.format_clock(meeting.end_time()),
                names
                    .get(&meeting.department_id)
                    .map(String::as_str)
                    .unwrap_or("-"),
                meeting
                    .join_url
                    .as_deref()
                    .unwrap_or("Join link is being prepared"),
            ));
        }
        Ok(Outbound::text(text).with_menu(main_menu(user)))
    }

    async fn my_requests(&self, user: &User) -> DialogResult<Outbound> {
        let requests = self
            .lifecycle
            .list_requests(&BookingRequestFilter {
                requested_by: Some(user.id),
                limit: Some(RECENT_REQUESTS),
                ..Default::default()
            })
            .await?;

        if requests.is_empty() {
            return Ok(Outbound::text("You have no booking requests yet.").with_menu(main_menu(user)));
        }

        let mut text = String::from("📝 Your latest requests:\n");
        for request in &requests {
            text.push_str(&format!(
                "\n• {} · {} · {}",
                request.title,
                self.format_time(request.preferred_start_time),
                status_label(request.status)
            ));
            if let Some(reason) = &request.rejection_reason {
                text.push_str(&format!(" ({})", reason));
            }
        }
        Ok(Outbound::text(text).with_menu(main_menu(user)))
    }

    async fn pending_requests(&self) -> DialogResult<Outbound> {
        let requests = self
            .lifecycle
            .list_requests(&BookingRequestFilter {
                status: Some(BookingStatus::Pending),
                limit: Some(PENDING_PAGE),
                ..Default::default()
            })
            .await?;

        if requests.is_empty() {
            return Ok(Outbound::text("There are no pending requests.").with_menu(Menu::Admin));
        }

        let names = self.department_names().await?;
        let mut reply = Outbound::text(String::new()).with_menu(Menu::Admin);
        let mut text = String::from("⏳ Pending requests:\n");
        for (index, request) in requests.iter().enumerate() {
            let number = index + 1;
            let requester = match self.lifecycle.store().get_user(request.requested_by).await? {
                Some(user) => user.display_name(),
                None => "-".to_string(),
            };
            text.push_str(&format!(
                "\n{}. {} · {} · {} ({} min) · {}",
                number,
                request.title,
                names
                    .get(&request.department_id)
                    .map(String::as_str)
                    .unwrap_or("-"),
                self.format_time(request.preferred_start_time),
                request.duration_minutes,
                requester
            ));
            reply = reply
                .with_choice(
                    format!("✅ Approve {}", number),
                    Command::Review {
                        request_id: request.id,
                        action: ReviewAction::Approve,
                    },
                )
                .with_choice(
                    format!("❌ Reject {}", number),
                    Command::Review {
                        request_id: request.id,
                        action: ReviewAction::Reject,
                    },
                );
        }
        reply.text = text;
        Ok(reply)
    }

    async fn department_names(&self) -> DialogResult<HashMap<i64, String>> {
        Ok(self
            .lifecycle
            .store()
            .list_departments()
            .await?
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect())
    }

    async fn requester_external_id(&self, user_id: Uuid) -> Option<i64> {
        match self.lifecycle.store().get_user(user_id).await {
            Ok(user) => user.map(|u| u.external_id),
            Err(err) => {
                warn!("Could not look up requester {} for notice: {}", user_id, err);
                None
            }
        }
    }

    /// Error text plus the idle menu the conversation returns to
    fn failure_reply(&self, conversation_id: i64, err: DialogError, menu: Menu) -> Outbound {
        let text = match err {
            DialogError::Booking(BookingError::Validation(err)) => correction(&err),
            DialogError::Booking(BookingError::AdmissionDenied(denied)) => denial(&denied),
            DialogError::Booking(BookingError::NotFound { entity, .. }) => {
                format!("The {} could not be found.", entity)
            }
            DialogError::Booking(BookingError::AlreadyProcessed { status, .. }) => {
                format!("This request has already been {}. Nothing changed.", status)
            }
            DialogError::Booking(BookingError::Forbidden(_)) => STAFF_ONLY.to_string(),
            DialogError::Booking(BookingError::Store(err)) => {
                error!("Record store failure in conversation {}: {}", conversation_id, err);
                RETRY.to_string()
            }
            DialogError::Session(err) => {
                error!(
                    "Session store failure in conversation {}: {:#}",
                    conversation_id, err
                );
                RETRY.to_string()
            }
        };
        Outbound::text(text).with_menu(menu)
    }

    fn format_time(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.lifecycle.policy().reference_offset)
            .format("%d.%m.%Y %H:%M")
            .to_string()
    }

    fn format_clock(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.lifecycle.policy().reference_offset)
            .format("%H:%M")
            .to_string()
    }
}

const HELP: &str = "How booking works:\n\
    1. Choose \"Book a meeting\" and pick your department.\n\
    2. Enter a title, a start time for today (HH:MM) and a duration in minutes.\n\
    3. Add a description, or send '-' to skip it.\n\n\
    Your request is then reviewed by staff and you will be notified of the decision.\n\
    Send /cancel at any point to abandon a booking.";

fn main_menu(user: &User) -> Menu {
    Menu::Main {
        staff: user.is_staff,
    }
}

/// Staff working in the admin section go back to it; everyone else to the main menu
fn failure_menu(user: &User, event: &Event) -> Menu {
    match event {
        Event::Command(command) if user.is_staff && command.is_staff_only() => Menu::Admin,
        _ => main_menu(user),
    }
}

fn status_label(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Pending => "⏳ pending",
        BookingStatus::Approved => "✅ approved",
        BookingStatus::Rejected => "❌ rejected",
        BookingStatus::Cancelled => "🚫 cancelled",
    }
}

fn denial(denied: &AdmissionDenied) -> String {
    match denied.scope {
        CapScope::User => format!(
            "You have reached the daily limit of {} meetings for {}.",
            denied.limit,
            denied.day.format("%d.%m.%Y")
        ),
        CapScope::Department => format!(
            "The department has reached its daily limit of {} meetings for {}.",
            denied.limit,
            denied.day.format("%d.%m.%Y")
        ),
    }
}

fn correction(err: &ValidationError) -> String {
    match err {
        ValidationError::DepartmentUnavailable(_) => {
            "Please choose one of the offered departments.".to_string()
        }
        ValidationError::EmptyTitle => "The title must not be empty.".to_string(),
        ValidationError::TitleTooLong { max } => {
            format!("The title must be at most {} characters long.", max)
        }
        ValidationError::InvalidTimeFormat(_) => {
            "Please use the HH:MM format, for example 14:30.".to_string()
        }
        ValidationError::StartTimeNotInFuture(_) => {
            "That time has already passed today. Please enter a later time.".to_string()
        }
        ValidationError::DurationNotNumeric(_) => {
            "Please enter the duration as a whole number of minutes.".to_string()
        }
        ValidationError::DurationOutOfRange(_) => {
            "The duration must be between 1 and 480 minutes.".to_string()
        }
    }
}

/// Prompt for the session's current stage, after a correction if any
fn stage_reply(session: &IntakeSession, err: Option<&ValidationError>) -> Outbound {
    let mut text = String::new();
    if let Some(err) = err {
        text.push_str(&format!("⚠️ {}\n\n", correction(err)));
    }
    if session.stage == IntakeStage::AwaitingTitle {
        if let Some(department) = session.selected_department() {
            text.push_str(&format!("Department: {}\n", department.name));
        }
    }
    text.push_str(session.stage.prompt());

    let mut reply = Outbound::text(text).with_menu(Menu::Intake);
    if session.stage == IntakeStage::AwaitingDepartment {
        for department in &session.departments {
            reply = reply.with_choice(&department.name, Command::SelectDepartment(department.id));
        }
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionPolicy;
    use crate::clock::FixedClock;
    use crate::intake::InMemorySessionStore;
    use crate::store::{InMemoryRecordStore, RecordStore};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    // 09:00 at UTC+05:00
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap()
    }

    fn sender(external_id: i64) -> SenderProfile {
        SenderProfile {
            external_id,
            username: Some(format!("user{}", external_id)),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
        }
    }

    fn text(external_id: i64, body: &str) -> Inbound {
        Inbound {
            conversation_id: external_id,
            sender: sender(external_id),
            event: Event::Text(body.to_string()),
        }
    }

    fn command(external_id: i64, command: Command) -> Inbound {
        Inbound {
            conversation_id: external_id,
            sender: sender(external_id),
            event: Event::Command(command),
        }
    }

    fn dispatcher(store: Arc<InMemoryRecordStore>) -> Dispatcher {
        let lifecycle = LifecycleManager::new(
            store,
            AdmissionPolicy::default(),
            Arc::new(FixedClock::new(now())),
        );
        Dispatcher::new(
            lifecycle,
            Arc::new(InMemorySessionStore::new(Duration::minutes(30))),
            false,
        )
    }

    #[tokio::test]
    async fn test_unknown_sender_is_registered_once() {
        let store = Arc::new(InMemoryRecordStore::new());
        let dispatcher = dispatcher(store.clone());

        dispatcher.handle(&command(10, Command::Start)).await;
        dispatcher.handle(&text(10, "hello")).await;

        let user = store.find_user(10).await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("user10"));
    }

    #[tokio::test]
    async fn test_free_text_without_session_is_unrecognized() {
        let store = Arc::new(InMemoryRecordStore::new());
        let reply = dispatcher(store).handle(&text(10, "hello")).await;
        assert!(reply.text.contains("did not understand"));
        assert_eq!(reply.menu, Some(Menu::Main { staff: false }));
    }

    #[tokio::test]
    async fn test_book_without_membership_explains() {
        let store = Arc::new(InMemoryRecordStore::new());
        let reply = dispatcher(store).handle(&command(10, Command::Book)).await;
        assert!(reply.text.contains("not assigned to any department"));
    }

    #[tokio::test]
    async fn test_book_offers_member_departments() {
        let store = Arc::new(InMemoryRecordStore::new());
        let user = store.seed_user(10, "member", false).await;
        let finance = store.seed_department("Finance", 10).await;
        store.seed_department("Legal", 10).await;
        store.add_membership(user.id, finance.id).await;

        let reply = dispatcher(store).handle(&command(10, Command::Book)).await;
        assert_eq!(reply.menu, Some(Menu::Intake));
        assert_eq!(reply.choices.len(), 1);
        assert_eq!(reply.choices[0].command, Command::SelectDepartment(finance.id));
    }

    #[tokio::test]
    async fn test_member_cannot_open_admin() {
        let store = Arc::new(InMemoryRecordStore::new());
        let reply = dispatcher(store)
            .handle(&command(10, Command::PendingRequests))
            .await;
        assert_eq!(reply.text, STAFF_ONLY);
    }

    #[tokio::test]
    async fn test_store_failure_asks_to_retry() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.set_unavailable(true);
        let reply = dispatcher(store).handle(&command(10, Command::Profile)).await;
        assert_eq!(reply.text, RETRY);
        assert_eq!(reply.menu, Some(Menu::Main { staff: false }));
    }

    #[tokio::test]
    async fn test_stale_review_returns_to_admin_menu() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.seed_user(20, "reviewer", true).await;

        let reply = dispatcher(store)
            .handle(&command(
                20,
                Command::Review {
                    request_id: Uuid::new_v4(),
                    action: ReviewAction::Approve,
                },
            ))
            .await;
        assert!(reply.text.contains("could not be found"));
        assert_eq!(reply.menu, Some(Menu::Admin));
    }

    #[tokio::test]
    async fn test_cancel_without_session() {
        let store = Arc::new(InMemoryRecordStore::new());
        let reply = dispatcher(store).handle(&command(10, Command::Cancel)).await;
        assert_eq!(reply.text, "There is nothing to cancel.");
    }
}
