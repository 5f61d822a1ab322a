//! Booking admission and conversational intake engine
//!
//! Members of departments request time-boxed online meetings through a chat
//! dialog; staff reviewers approve or reject them; approved requests are
//! promoted into scheduled meetings. This crate owns that core:
//!
//! - [`admission`]: per-user and per-department daily caps
//! - [`intake`]: the per-conversation booking dialog and its session stores
//! - [`lifecycle`]: request/meeting state transitions and promotion
//! - [`dialog`]: routing of inbound chat events and per-conversation ordering
//! - [`store`]: the record store seam with PostgreSQL and in-memory backends
//! - [`reporting`]: aggregate counts for the dashboard

pub mod admission;
pub mod clock;
pub mod dialog;
pub mod error;
pub mod intake;
pub mod lifecycle;
pub mod models;
pub mod reporting;
pub mod store;
pub mod validation;

pub use admission::{AdmissionController, AdmissionPolicy};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{BookingError, BookingResult};
pub use lifecycle::LifecycleManager;
pub use reporting::Reporter;
pub use store::{RecordStore, SharedStore};
