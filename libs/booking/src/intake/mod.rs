//! Conversational booking intake
//!
//! An [`IntakeSession`] collects department, title, start time, duration and
//! description one message at a time. It never writes anything on its own;
//! the completed [`BookingDraft`] is handed to the lifecycle manager.

pub mod session;
pub mod store;

pub use session::{BookingDraft, DepartmentOption, IntakeInput, IntakeSession, IntakeStage, Step};
pub use store::{InMemorySessionStore, RedisSessionStore, SessionStore, SharedSessionStore};
