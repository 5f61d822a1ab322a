//! Application state shared across handlers

use booking::dialog::ConversationQueue;

use crate::telegram::TelegramClient;

#[derive(Clone)]
pub struct AppState {
    pub queue: ConversationQueue,
    pub telegram: TelegramClient,
    pub webhook_secret: Option<String>,
}
