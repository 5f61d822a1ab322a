//! Error taxonomy of the booking core

use common::error::DatabaseError;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::admission::AdmissionDenied;
use crate::models::BookingStatus;
use crate::validation::ValidationError;

/// Kind of record a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Department,
    BookingRequest,
    Meeting,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::User => "user",
            Entity::Department => "department",
            Entity::BookingRequest => "booking request",
            Entity::Meeting => "meeting",
        })
    }
}

#[derive(Error, Debug)]
pub enum BookingError {
    /// Malformed or out-of-range input; recovered by re-prompting
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A daily cap is reached
    #[error(transparent)]
    AdmissionDenied(#[from] AdmissionDenied),

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    /// Stale or duplicate review action on a terminal request
    #[error("booking request {id} is already {status}")]
    AlreadyProcessed { id: Uuid, status: BookingStatus },

    #[error("user {0} is not allowed to perform this action")]
    Forbidden(Uuid),

    #[error("Record store error: {0}")]
    Store(#[from] DatabaseError),
}

impl BookingError {
    pub fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        BookingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Type alias for Result with BookingError
pub type BookingResult<T> = Result<T, BookingError>;
