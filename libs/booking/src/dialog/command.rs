//! Tagged commands decoded once at the transport boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Start,
    Help,
    Profile,
    Book,
    MyMeetings,
    MyRequests,
    Admin,
    Back,
    Cancel,
    SelectDepartment(i64),
    PendingRequests,
    Review {
        request_id: Uuid,
        action: ReviewAction,
    },
}

impl Command {
    /// Commands that only staff may issue
    pub fn is_staff_only(&self) -> bool {
        matches!(
            self,
            Command::Admin | Command::PendingRequests | Command::Review { .. }
        )
    }
}
