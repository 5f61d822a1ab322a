//! Telegram Bot API wire types and a thin HTTP client

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::keyboard;
use booking::dialog::Outbound;

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub edited_message: Option<TelegramMessage>,
    #[serde(default)]
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramCallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
struct TelegramSendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<TelegramReplyMarkup>,
}

#[derive(Debug, Serialize)]
struct TelegramAnswerCallback<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelegramReplyMarkup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_keyboard: Option<Vec<Vec<TelegramInlineButton>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Vec<Vec<TelegramKeyboardButton>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize_keyboard: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelegramInlineButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelegramKeyboardButton {
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        }
    }

    async fn call<T: Serialize>(&self, method: &str, payload: &T) -> Result<()> {
        let response: TelegramResponse = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .json(payload)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            bail!(
                "Telegram {} failed: {}",
                method,
                response.description.unwrap_or_default()
            );
        }
        Ok(())
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<TelegramReplyMarkup>,
    ) -> Result<()> {
        self.call(
            "sendMessage",
            &TelegramSendMessage {
                chat_id,
                text,
                reply_markup,
            },
        )
        .await
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        self.call(
            "answerCallbackQuery",
            &TelegramAnswerCallback { callback_query_id },
        )
        .await
    }

    /// Send a reply to its chat, then each notice to its recipient.
    /// Notice failures are logged and do not affect the reply.
    pub async fn deliver(&self, chat_id: i64, outbound: &Outbound) {
        if let Err(e) = self
            .send_message(chat_id, &outbound.text, keyboard::render(outbound))
            .await
        {
            warn!("Failed to send reply to chat {}: {}", chat_id, e);
        }

        for notice in &outbound.notices {
            match self.send_message(notice.external_id, &notice.text, None).await {
                Ok(()) => debug!("Notice sent to {}", notice.external_id),
                Err(e) => warn!("Failed to notify {}: {}", notice.external_id, e),
            }
        }
    }
}
