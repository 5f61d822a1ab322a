//! End-to-end booking dialog against the in-memory record store

use booking::admission::AdmissionPolicy;
use booking::clock::{Clock, FixedClock};
use booking::dialog::{Command, Dispatcher, Event, Inbound, Menu, SenderProfile};
use anyhow::{Result, bail};
use async_trait::async_trait;
use booking::intake::{InMemorySessionStore, IntakeSession, IntakeStage, SessionStore};
use booking::lifecycle::LifecycleManager;
use booking::models::{BookingRequestFilter, BookingStatus, MeetingFilter, NewMeeting};
use booking::store::{InMemoryRecordStore, RecordStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const MEMBER: i64 = 100;

// 09:00 at UTC+05:00
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap()
}

struct Harness {
    store: Arc<InMemoryRecordStore>,
    sessions: Arc<InMemorySessionStore>,
    clock: FixedClock,
    dispatcher: Dispatcher,
    department_id: i64,
}

async fn harness(auto_schedule: bool) -> Harness {
    let store = Arc::new(InMemoryRecordStore::new());
    let member = store.seed_user(MEMBER, "member", false).await;
    let department = store.seed_department("Finance", 10).await;
    store.add_membership(member.id, department.id).await;

    let clock = FixedClock::new(now());
    let sessions = Arc::new(InMemorySessionStore::new(Duration::minutes(30)));
    let lifecycle = LifecycleManager::new(
        store.clone(),
        AdmissionPolicy::default(),
        Arc::new(clock.clone()),
    );
    let dispatcher = Dispatcher::new(lifecycle, sessions.clone(), auto_schedule);

    Harness {
        store,
        sessions,
        clock,
        dispatcher,
        department_id: department.id,
    }
}

fn event(event: Event) -> Inbound {
    Inbound {
        conversation_id: MEMBER,
        sender: SenderProfile {
            external_id: MEMBER,
            username: Some("member".to_string()),
            first_name: "Member".to_string(),
            last_name: String::new(),
        },
        event,
    }
}

fn say(text: &str) -> Inbound {
    event(Event::Text(text.to_string()))
}

fn run(command: Command) -> Inbound {
    event(Event::Command(command))
}

impl Harness {
    async fn stage(&self) -> Option<IntakeStage> {
        self.sessions
            .load(MEMBER, self.clock.now())
            .await
            .unwrap()
            .map(|s| s.stage)
    }

    async fn request_count(&self) -> i64 {
        self.store
            .count_booking_requests(&BookingRequestFilter::default())
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_dialog_submits_collected_fields_only_at_the_end() {
    let h = harness(false).await;

    h.dispatcher.handle(&run(Command::Book)).await;
    h.dispatcher
        .handle(&run(Command::SelectDepartment(h.department_id)))
        .await;
    h.dispatcher.handle(&say("Team sync")).await;
    h.dispatcher.handle(&say("14:30")).await;
    h.dispatcher.handle(&say("45")).await;
    assert_eq!(h.request_count().await, 0);
    assert_eq!(h.stage().await, Some(IntakeStage::AwaitingDescription));

    let reply = h.dispatcher.handle(&say("weekly")).await;
    assert!(reply.text.contains("sent for review"));
    assert_eq!(reply.menu, Some(Menu::Main { staff: false }));
    assert_eq!(h.stage().await, None);

    let requests = h
        .store
        .list_booking_requests(&BookingRequestFilter::default())
        .await
        .unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.department_id, h.department_id);
    assert_eq!(request.title, "Team sync");
    assert_eq!(
        request.preferred_start_time,
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap()
    );
    assert_eq!(request.duration_minutes, 45);
    assert_eq!(request.description, "weekly");
    assert_eq!(request.status, BookingStatus::Pending);
}

#[tokio::test]
async fn test_invalid_inputs_reprompt_same_stage() {
    let h = harness(false).await;
    h.dispatcher.handle(&run(Command::Book)).await;

    let reply = h.dispatcher.handle(&say("Marketing")).await;
    assert!(reply.text.contains("offered departments"));
    assert_eq!(h.stage().await, Some(IntakeStage::AwaitingDepartment));

    h.dispatcher.handle(&say("finance")).await;
    h.dispatcher.handle(&say("Planning")).await;

    for past in ["08:00", "09:00"] {
        let reply = h.dispatcher.handle(&say(past)).await;
        assert!(reply.text.contains("already passed"));
        assert_eq!(h.stage().await, Some(IntakeStage::AwaitingStartTime));
    }

    h.dispatcher.handle(&say("16:00")).await;
    for duration in ["0", "481", "abc"] {
        h.dispatcher.handle(&say(duration)).await;
        assert_eq!(h.stage().await, Some(IntakeStage::AwaitingDuration));
    }
    assert_eq!(h.request_count().await, 0);
}

#[tokio::test]
async fn test_cancel_discards_session_without_side_effects() {
    let h = harness(false).await;
    h.dispatcher.handle(&run(Command::Book)).await;
    h.dispatcher.handle(&say("Finance")).await;
    h.dispatcher.handle(&say("Planning")).await;

    let reply = h.dispatcher.handle(&run(Command::Cancel)).await;
    assert_eq!(reply.text, "Booking cancelled.");
    assert_eq!(h.stage().await, None);
    assert_eq!(h.request_count().await, 0);
}

#[tokio::test]
async fn test_book_restarts_running_intake() {
    let h = harness(false).await;
    h.dispatcher.handle(&run(Command::Book)).await;
    h.dispatcher.handle(&say("Finance")).await;
    assert_eq!(h.stage().await, Some(IntakeStage::AwaitingTitle));

    h.dispatcher.handle(&run(Command::Book)).await;
    assert_eq!(h.stage().await, Some(IntakeStage::AwaitingDepartment));
}

#[tokio::test]
async fn test_start_time_expiring_before_submit_rewinds() {
    let h = harness(false).await;
    h.dispatcher.handle(&run(Command::Book)).await;
    for input in ["Finance", "Planning", "09:10", "30"] {
        h.dispatcher.handle(&say(input)).await;
    }

    // The user took a quarter of an hour to write the description
    h.clock.advance(Duration::minutes(15));
    let reply = h.dispatcher.handle(&say("agenda")).await;
    assert!(reply.text.contains("already passed"));
    assert_eq!(h.stage().await, Some(IntakeStage::AwaitingStartTime));
    assert_eq!(h.request_count().await, 0);
}

#[tokio::test]
async fn test_store_failure_keeps_session_for_retry() {
    let h = harness(false).await;
    h.dispatcher.handle(&run(Command::Book)).await;
    for input in ["Finance", "Planning", "15:00", "30"] {
        h.dispatcher.handle(&say(input)).await;
    }

    h.store.set_read_only(true);
    let reply = h.dispatcher.handle(&say("agenda")).await;
    assert!(reply.text.contains("could not be saved"));
    assert_eq!(reply.menu, Some(Menu::Intake));
    assert_eq!(h.stage().await, Some(IntakeStage::AwaitingDescription));

    h.store.set_read_only(false);
    let reply = h.dispatcher.handle(&say("agenda")).await;
    assert!(reply.text.contains("sent for review"));
    assert_eq!(h.request_count().await, 1);
}

#[tokio::test]
async fn test_user_cap_blocks_booking_start() {
    let h = harness(false).await;
    let member = h.store.find_user(MEMBER).await.unwrap().unwrap();
    for hour in [10, 11, 12, 13, 14] {
        h.store
            .insert_meeting(NewMeeting {
                title: "Existing".to_string(),
                description: String::new(),
                department_id: h.department_id,
                created_by: member.id,
                start_time: Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap(),
                duration_minutes: 30,
            })
            .await;
    }

    let reply = h.dispatcher.handle(&run(Command::Book)).await;
    assert!(reply.text.contains("daily limit of 5"));
    assert_eq!(h.stage().await, None);
}

#[tokio::test]
async fn test_department_cap_at_submit_discards_session() {
    let h = harness(false).await;
    let colleague = h.store.seed_user(200, "colleague", false).await;
    for minute in 0..10 {
        h.store
            .insert_meeting(NewMeeting {
                title: "Busy".to_string(),
                description: String::new(),
                department_id: h.department_id,
                created_by: colleague.id,
                start_time: Utc.with_ymd_and_hms(2025, 3, 10, 12, minute, 0).unwrap(),
                duration_minutes: 30,
            })
            .await;
    }

    h.dispatcher.handle(&run(Command::Book)).await;
    for input in ["Finance", "Planning", "15:00", "30"] {
        h.dispatcher.handle(&say(input)).await;
    }
    let reply = h.dispatcher.handle(&say("agenda")).await;
    assert!(reply.text.contains("department has reached its daily limit of 10"));
    assert_eq!(reply.menu, Some(Menu::Main { staff: false }));
    assert_eq!(h.stage().await, None);
    assert_eq!(h.request_count().await, 0);
}

#[tokio::test]
async fn test_auto_schedule_creates_meeting_directly() {
    let h = harness(true).await;
    h.dispatcher.handle(&run(Command::Book)).await;
    for input in ["Finance", "Standup", "10:00", "15", "-"] {
        h.dispatcher.handle(&say(input)).await;
    }

    assert_eq!(h.request_count().await, 0);
    let meetings = h.store.list_meetings(&MeetingFilter::default()).await.unwrap();
    assert_eq!(meetings.len(), 1);
    assert_eq!(meetings[0].title, "Standup");
    assert_eq!(meetings[0].description, "");
}

/// Session store whose `remove` can be made to fail
struct FailingRemove {
    inner: InMemorySessionStore,
    fail: AtomicBool,
}

#[async_trait]
impl SessionStore for FailingRemove {
    async fn load(&self, conversation_id: i64, now: DateTime<Utc>) -> Result<Option<IntakeSession>> {
        self.inner.load(conversation_id, now).await
    }

    async fn save(&self, session: &IntakeSession) -> Result<()> {
        self.inner.save(session).await
    }

    async fn remove(&self, conversation_id: i64) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("session backend unavailable");
        }
        self.inner.remove(conversation_id).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.inner.purge_expired(now).await
    }
}

#[tokio::test]
async fn test_session_remove_failure_never_duplicates_request() {
    let store = Arc::new(InMemoryRecordStore::new());
    let member = store.seed_user(MEMBER, "member", false).await;
    let department = store.seed_department("Finance", 10).await;
    store.add_membership(member.id, department.id).await;

    let clock = FixedClock::new(now());
    let sessions = Arc::new(FailingRemove {
        inner: InMemorySessionStore::new(Duration::minutes(30)),
        fail: AtomicBool::new(false),
    });
    let lifecycle = LifecycleManager::new(
        store.clone(),
        AdmissionPolicy::default(),
        Arc::new(clock.clone()),
    );
    let dispatcher = Dispatcher::new(lifecycle, sessions.clone(), false);

    dispatcher.handle(&run(Command::Book)).await;
    for input in ["Finance", "Planning", "15:00", "30"] {
        dispatcher.handle(&say(input)).await;
    }

    sessions.fail.store(true, Ordering::SeqCst);
    let reply = dispatcher.handle(&say("agenda")).await;
    assert!(reply.text.contains("try again"));
    assert!(reply.menu.is_some());

    let filter = BookingRequestFilter::default();
    assert_eq!(store.count_booking_requests(&filter).await.unwrap(), 0);
    let stage = sessions.load(MEMBER, clock.now()).await.unwrap().map(|s| s.stage);
    assert_eq!(stage, Some(IntakeStage::AwaitingDescription));

    sessions.fail.store(false, Ordering::SeqCst);
    let reply = dispatcher.handle(&say("agenda")).await;
    assert!(reply.text.contains("sent for review"));
    assert_eq!(store.count_booking_requests(&filter).await.unwrap(), 1);

    let reply = dispatcher.handle(&say("agenda")).await;
    assert!(reply.text.contains("did not understand"));
    assert_eq!(store.count_booking_requests(&filter).await.unwrap(), 1);
}
