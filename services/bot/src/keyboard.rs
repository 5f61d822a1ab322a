//! Mapping between Telegram text, buttons and dialog commands
//!
//! Slash commands, reply keyboard labels and inline callback data are all
//! decoded into [`Command`] here, so the dialog never sees raw labels.

use booking::dialog::{Choice, Command, Event, Inbound, Menu, Outbound, ReviewAction, SenderProfile};
use uuid::Uuid;

use crate::telegram::{
    TelegramInlineButton, TelegramKeyboardButton, TelegramReplyMarkup, TelegramUpdate,
    TelegramUser,
};

pub const BOOK: &str = "📅 Book a meeting";
pub const MY_MEETINGS: &str = "🗓 My meetings";
pub const MY_REQUESTS: &str = "📝 My requests";
pub const PROFILE: &str = "👤 Profile";
pub const HELP: &str = "ℹ️ Help";
pub const ADMIN: &str = "⚙️ Admin";
pub const PENDING: &str = "⏳ Pending requests";
pub const BACK: &str = "⬅️ Back";
pub const CANCEL: &str = "❌ Cancel";

/// An update the dialog should handle
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUpdate {
    pub inbound: Inbound,
    /// Set for button presses, which Telegram expects to be answered
    pub callback_id: Option<String>,
}

pub fn decode_update(update: &TelegramUpdate) -> Option<DecodedUpdate> {
    if let Some(callback) = &update.callback_query {
        let command = callback.data.as_deref().and_then(decode_callback)?;
        let conversation_id = callback
            .message
            .as_ref()
            .map(|message| message.chat.id)
            .unwrap_or(callback.from.id);

        return Some(DecodedUpdate {
            inbound: Inbound {
                conversation_id,
                sender: sender(&callback.from),
                event: Event::Command(command),
            },
            callback_id: Some(callback.id.clone()),
        });
    }

    let message = update.message.as_ref()?;
    let from = message.from.as_ref()?;
    if from.is_bot {
        return None;
    }
    let text = message.text.as_deref()?;

    let event = match decode_text(text) {
        Some(command) => Event::Command(command),
        None => Event::Text(text.to_string()),
    };

    Some(DecodedUpdate {
        inbound: Inbound {
            conversation_id: message.chat.id,
            sender: sender(from),
            event,
        },
        callback_id: None,
    })
}

fn sender(user: &TelegramUser) -> SenderProfile {
    SenderProfile {
        external_id: user.id,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone().unwrap_or_default(),
    }
}

/// Slash commands and menu labels; anything else is free text
pub fn decode_text(text: &str) -> Option<Command> {
    let text = text.trim();

    if let Some(rest) = text.strip_prefix('/') {
        // "/book@my_bot extra" -> "book"
        let name = rest
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default();

        return match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "profile" => Some(Command::Profile),
            "book" => Some(Command::Book),
            "my_meetings" | "meetings" => Some(Command::MyMeetings),
            "my_requests" | "requests" => Some(Command::MyRequests),
            "admin" => Some(Command::Admin),
            "pending" => Some(Command::PendingRequests),
            "cancel" => Some(Command::Cancel),
            _ => None,
        };
    }

    match text {
        BOOK => Some(Command::Book),
        MY_MEETINGS => Some(Command::MyMeetings),
        MY_REQUESTS => Some(Command::MyRequests),
        PROFILE => Some(Command::Profile),
        HELP => Some(Command::Help),
        ADMIN => Some(Command::Admin),
        PENDING => Some(Command::PendingRequests),
        BACK => Some(Command::Back),
        CANCEL => Some(Command::Cancel),
        _ => None,
    }
}

/// Callback data stays well under Telegram's 64 byte limit
pub fn encode_callback(command: &Command) -> String {
    match command {
        Command::SelectDepartment(id) => format!("dept:{}", id),
        Command::Review { request_id, action } => format!("review:{}:{}", action, request_id),
        Command::Start => "cmd:start".to_string(),
        Command::Help => "cmd:help".to_string(),
        Command::Profile => "cmd:profile".to_string(),
        Command::Book => "cmd:book".to_string(),
        Command::MyMeetings => "cmd:my_meetings".to_string(),
        Command::MyRequests => "cmd:my_requests".to_string(),
        Command::Admin => "cmd:admin".to_string(),
        Command::Back => "cmd:back".to_string(),
        Command::Cancel => "cmd:cancel".to_string(),
        Command::PendingRequests => "cmd:pending".to_string(),
    }
}

pub fn decode_callback(data: &str) -> Option<Command> {
    let mut parts = data.splitn(3, ':');
    match (parts.next()?, parts.next(), parts.next()) {
        ("dept", Some(id), None) => id.parse().ok().map(Command::SelectDepartment),
        ("review", Some(action), Some(id)) => {
            let action = match action {
                "approve" => ReviewAction::Approve,
                "reject" => ReviewAction::Reject,
                _ => return None,
            };
            let request_id = Uuid::parse_str(id).ok()?;
            Some(Command::Review { request_id, action })
        }
        ("cmd", Some("back"), None) => Some(Command::Back),
        ("cmd", Some(name), None) => decode_text(&format!("/{}", name)),
        _ => None,
    }
}

/// Inline buttons win over the persistent menu since a message carries
/// a single markup.
pub fn render(outbound: &Outbound) -> Option<TelegramReplyMarkup> {
    if !outbound.choices.is_empty() {
        return Some(TelegramReplyMarkup {
            inline_keyboard: Some(inline_rows(&outbound.choices)),
            ..Default::default()
        });
    }

    outbound.menu.map(|menu| TelegramReplyMarkup {
        keyboard: Some(menu_rows(menu)),
        resize_keyboard: Some(true),
        ..Default::default()
    })
}

/// One row per choice, except that the review buttons of a request share a row
fn inline_rows(choices: &[Choice]) -> Vec<Vec<TelegramInlineButton>> {
    let mut rows: Vec<Vec<TelegramInlineButton>> = Vec::new();
    let mut last_request: Option<Uuid> = None;

    for choice in choices {
        let button = TelegramInlineButton {
            text: choice.label.clone(),
            callback_data: encode_callback(&choice.command),
        };

        let request = match choice.command {
            Command::Review { request_id, .. } => Some(request_id),
            _ => None,
        };

        match rows.last_mut() {
            Some(row) if request.is_some() && request == last_request => row.push(button),
            _ => rows.push(vec![button]),
        }
        last_request = request;
    }

    rows
}

fn menu_rows(menu: Menu) -> Vec<Vec<TelegramKeyboardButton>> {
    let labels: Vec<Vec<&str>> = match menu {
        Menu::Main { staff } => {
            let mut rows = vec![vec![BOOK], vec![MY_MEETINGS, MY_REQUESTS], vec![PROFILE, HELP]];
            if staff {
                rows.push(vec![ADMIN]);
            }
            rows
        }
        Menu::Admin => vec![vec![PENDING], vec![BACK]],
        Menu::Intake => vec![vec![CANCEL]],
    };

    labels
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|text| TelegramKeyboardButton {
                    text: text.to_string(),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: &str) -> TelegramUpdate {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_decode_slash_commands() {
        assert_eq!(decode_text("/start"), Some(Command::Start));
        assert_eq!(decode_text("/book@meeting_bot"), Some(Command::Book));
        assert_eq!(decode_text("  /MY_MEETINGS  "), Some(Command::MyMeetings));
        assert_eq!(decode_text("/cancel now"), Some(Command::Cancel));
        assert_eq!(decode_text("/unknown"), None);
    }

    #[test]
    fn test_decode_menu_labels() {
        assert_eq!(decode_text(BOOK), Some(Command::Book));
        assert_eq!(decode_text(PENDING), Some(Command::PendingRequests));
        assert_eq!(decode_text(BACK), Some(Command::Back));
        assert_eq!(decode_text("Weekly sync"), None);
    }

    #[test]
    fn test_callback_data_decodes() {
        let request_id = Uuid::new_v4();
        let review = Command::Review {
            request_id,
            action: ReviewAction::Reject,
        };

        assert_eq!(decode_callback(&encode_callback(&review)), Some(review));
        assert_eq!(decode_callback("dept:7"), Some(Command::SelectDepartment(7)));
        assert_eq!(decode_callback("cmd:back"), Some(Command::Back));
        assert_eq!(decode_callback("cmd:pending"), Some(Command::PendingRequests));
        assert!(encode_callback(&review).len() <= 64);
    }

    #[test]
    fn test_malformed_callback_data_is_ignored() {
        assert_eq!(decode_callback("dept:abc"), None);
        assert_eq!(decode_callback("review:maybe:00000000-0000-0000-0000-000000000000"), None);
        assert_eq!(decode_callback("review:approve:not-a-uuid"), None);
        assert_eq!(decode_callback(""), None);
    }

    #[test]
    fn test_decode_message_update() {
        let decoded = decode_update(&update(
            r#"{"update_id": 1, "message": {"message_id": 5, "date": 0,
                "from": {"id": 42, "is_bot": false, "first_name": "Ann", "last_name": "Lee"},
                "chat": {"id": 42, "type": "private"}, "text": "Weekly sync"}}"#,
        ))
        .unwrap();

        assert_eq!(decoded.callback_id, None);
        assert_eq!(decoded.inbound.conversation_id, 42);
        assert_eq!(decoded.inbound.sender.last_name, "Lee");
        assert_eq!(decoded.inbound.event, Event::Text("Weekly sync".to_string()));
    }

    #[test]
    fn test_decode_callback_update() {
        let decoded = decode_update(&update(
            r#"{"update_id": 2, "callback_query": {"id": "cb-1", "data": "dept:3",
                "from": {"id": 42, "first_name": "Ann"},
                "message": {"message_id": 6, "date": 0, "chat": {"id": 99, "type": "private"}}}}"#,
        ))
        .unwrap();

        assert_eq!(decoded.callback_id.as_deref(), Some("cb-1"));
        assert_eq!(decoded.inbound.conversation_id, 99);
        assert_eq!(
            decoded.inbound.event,
            Event::Command(Command::SelectDepartment(3))
        );
    }

    #[test]
    fn test_updates_without_text_are_skipped() {
        assert!(decode_update(&update(
            r#"{"update_id": 3, "message": {"message_id": 7, "date": 0,
                "from": {"id": 42, "first_name": "Ann"}, "chat": {"id": 42, "type": "private"}}}"#,
        ))
        .is_none());
        assert!(decode_update(&update(r#"{"update_id": 4}"#)).is_none());
    }

    #[test]
    fn test_render_main_menu() {
        let markup = render(&Outbound::text("Hi").with_menu(Menu::Main { staff: true })).unwrap();
        let keyboard = markup.keyboard.unwrap();

        assert_eq!(keyboard.len(), 4);
        assert_eq!(keyboard[3][0].text, ADMIN);
        assert!(markup.inline_keyboard.is_none());

        let plain = render(&Outbound::text("Hi").with_menu(Menu::Main { staff: false })).unwrap();
        assert_eq!(plain.keyboard.unwrap().len(), 3);
    }

    #[test]
    fn test_render_review_choices_share_a_row() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let outbound = Outbound::text("Pending")
            .with_menu(Menu::Admin)
            .with_choice("Approve", Command::Review { request_id: first, action: ReviewAction::Approve })
            .with_choice("Reject", Command::Review { request_id: first, action: ReviewAction::Reject })
            .with_choice("Approve", Command::Review { request_id: second, action: ReviewAction::Approve })
            .with_choice("Reject", Command::Review { request_id: second, action: ReviewAction::Reject });

        let rows = render(&outbound).unwrap().inline_keyboard.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1][1].callback_data, format!("review:reject:{}", second));
    }

    #[test]
    fn test_plain_text_has_no_markup() {
        assert!(render(&Outbound::text("Done")).is_none());
    }
}
