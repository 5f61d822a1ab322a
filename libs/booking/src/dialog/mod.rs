//! Dialog routing between the chat transport and the booking core
//!
//! The transport decodes every update into an [`Inbound`] event and renders
//! the returned [`Outbound`] reply. Nothing in here knows about keyboard
//! labels or wire formats.

pub mod command;
pub mod dispatcher;
pub mod queue;

pub use command::{Command, ReviewAction};
pub use dispatcher::Dispatcher;
pub use queue::ConversationQueue;

use serde::{Deserialize, Serialize};

use crate::models::NewUser;

/// Who sent an inbound event, as reported by the chat system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderProfile {
    pub external_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

impl From<&SenderProfile> for NewUser {
    fn from(sender: &SenderProfile) -> Self {
        NewUser {
            external_id: sender.external_id,
            username: sender.username.clone(),
            first_name: sender.first_name.clone(),
            last_name: sender.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Text(String),
    Command(Command),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    pub conversation_id: i64,
    pub sender: SenderProfile,
    pub event: Event,
}

/// Persistent menu shown under a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Menu {
    Main { staff: bool },
    Admin,
    /// Only a way out of the running booking
    Intake,
}

/// Inline choice attached to a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub command: Command,
}

/// Best-effort message to another user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub external_id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub text: String,
    pub menu: Option<Menu>,
    pub choices: Vec<Choice>,
    pub notices: Vec<Notice>,
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_menu(mut self, menu: Menu) -> Self {
        self.menu = Some(menu);
        self
    }

    pub fn with_choice(mut self, label: impl Into<String>, command: Command) -> Self {
        self.choices.push(Choice {
            label: label.into(),
            command,
        });
        self
    }

    pub fn with_notice(mut self, external_id: i64, text: impl Into<String>) -> Self {
        self.notices.push(Notice {
            external_id,
            text: text.into(),
        });
        self
    }
}
