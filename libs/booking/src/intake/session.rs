//! Intake session state machine

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Department;
use crate::validation::{self, Field, ValidationError};

/// Dialog stage, in strict order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntakeStage {
    AwaitingDepartment,
    AwaitingTitle,
    AwaitingStartTime,
    AwaitingDuration,
    AwaitingDescription,
    Complete,
}

impl IntakeStage {
    /// Stage that collects `field`
    pub fn for_field(field: Field) -> Self {
        match field {
            Field::Department => IntakeStage::AwaitingDepartment,
            Field::Title => IntakeStage::AwaitingTitle,
            Field::StartTime => IntakeStage::AwaitingStartTime,
            Field::Duration => IntakeStage::AwaitingDuration,
            Field::Description => IntakeStage::AwaitingDescription,
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            IntakeStage::AwaitingDepartment => "Choose the department for the meeting:",
            IntakeStage::AwaitingTitle => "Enter the meeting title:",
            IntakeStage::AwaitingStartTime => {
                "Enter the start time for today in HH:MM format (for example 14:30):"
            }
            IntakeStage::AwaitingDuration => "Enter the duration in minutes (1 to 480):",
            IntakeStage::AwaitingDescription => {
                "Enter a short description, or send '-' to leave it empty:"
            }
            IntakeStage::Complete => "The booking is complete.",
        }
    }
}

/// A department the user may book for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentOption {
    pub id: i64,
    pub name: String,
}

impl From<&Department> for DepartmentOption {
    fn from(department: &Department) -> Self {
        Self {
            id: department.id,
            name: department.name.clone(),
        }
    }
}

/// One inbound message for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeInput<'a> {
    Text(&'a str),
    /// Department picked from the offered choices
    Department(i64),
}

/// Fields of a fully collected booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub department_id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub description: String,
}

/// Result of feeding one input to a session
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Input accepted; the session now waits in the given stage
    Advanced(IntakeStage),
    /// Input rejected; the stage is unchanged
    Rejected(ValidationError),
    /// Input does not apply to the current stage
    Ignored,
    Completed(BookingDraft),
}

/// Per-conversation booking dialog state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeSession {
    pub conversation_id: i64,
    pub user_id: Uuid,
    pub stage: IntakeStage,
    pub departments: Vec<DepartmentOption>,
    pub department_id: Option<i64>,
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub description: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl IntakeSession {
    pub fn start(
        conversation_id: i64,
        user_id: Uuid,
        departments: Vec<DepartmentOption>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id,
            user_id,
            stage: IntakeStage::AwaitingDepartment,
            departments,
            department_id: None,
            title: None,
            start_time: None,
            duration_minutes: None,
            description: None,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, idle: Duration) -> bool {
        now - self.last_activity >= idle
    }

    pub fn selected_department(&self) -> Option<&DepartmentOption> {
        let id = self.department_id?;
        self.departments.iter().find(|d| d.id == id)
    }

    /// Validate one input and advance on success
    pub fn advance(&mut self, input: IntakeInput<'_>, now: DateTime<Utc>, offset: FixedOffset) -> Step {
        self.last_activity = now;

        let outcome = match (self.stage, input) {
            (IntakeStage::AwaitingDepartment, input) => self.resolve_department(input).map(|id| {
                self.department_id = Some(id);
            }),
            (_, IntakeInput::Department(_)) | (IntakeStage::Complete, _) => return Step::Ignored,
            (IntakeStage::AwaitingTitle, IntakeInput::Text(text)) => {
                validation::validate_title(text).map(|title| self.title = Some(title))
            }
            (IntakeStage::AwaitingStartTime, IntakeInput::Text(text)) => {
                validation::parse_start_time(text, now, offset)
                    .map(|start| self.start_time = Some(start))
            }
            (IntakeStage::AwaitingDuration, IntakeInput::Text(text)) => {
                validation::parse_duration(text).map(|minutes| self.duration_minutes = Some(minutes))
            }
            (IntakeStage::AwaitingDescription, IntakeInput::Text(text)) => {
                let text = text.trim();
                let description = if text == "-" { "" } else { text };
                self.description = Some(description.to_string());
                Ok(())
            }
        };

        if let Err(err) = outcome {
            return Step::Rejected(err);
        }

        self.stage = match self.stage {
            IntakeStage::AwaitingDepartment => IntakeStage::AwaitingTitle,
            IntakeStage::AwaitingTitle => IntakeStage::AwaitingStartTime,
            IntakeStage::AwaitingStartTime => IntakeStage::AwaitingDuration,
            IntakeStage::AwaitingDuration => IntakeStage::AwaitingDescription,
            IntakeStage::AwaitingDescription | IntakeStage::Complete => IntakeStage::Complete,
        };

        if self.stage != IntakeStage::Complete {
            return Step::Advanced(self.stage);
        }

        match self.draft() {
            Some(draft) => Step::Completed(draft),
            None => {
                // Fields lost (e.g. a session stored by an older build): start over
                self.rewind_to(Field::Department);
                Step::Rejected(ValidationError::DepartmentUnavailable(String::new()))
            }
        }
    }

    /// Return to the stage owning `field`, keeping everything collected before it
    pub fn rewind_to(&mut self, field: Field) {
        self.stage = IntakeStage::for_field(field);
    }

    pub fn draft(&self) -> Option<BookingDraft> {
        Some(BookingDraft {
            department_id: self.department_id?,
            user_id: self.user_id,
            title: self.title.clone()?,
            start_time: self.start_time?,
            duration_minutes: self.duration_minutes?,
            description: self.description.clone()?,
        })
    }

    /// Match a choice, a numeric id or a case-insensitive name against the offered departments
    fn resolve_department(&self, input: IntakeInput<'_>) -> Result<i64, ValidationError> {
        let found = match input {
            IntakeInput::Department(id) => self.departments.iter().find(|d| d.id == id),
            IntakeInput::Text(text) => {
                let text = text.trim();
                match text.parse::<i64>() {
                    Ok(id) => self.departments.iter().find(|d| d.id == id),
                    Err(_) => {
                        let wanted = text.to_lowercase();
                        self.departments
                            .iter()
                            .find(|d| d.name.to_lowercase() == wanted)
                    }
                }
            }
        };

        found.map(|d| d.id).ok_or_else(|| {
            ValidationError::DepartmentUnavailable(match input {
                IntakeInput::Department(id) => id.to_string(),
                IntakeInput::Text(text) => text.trim().to_string(),
            })
        })
    }
}
