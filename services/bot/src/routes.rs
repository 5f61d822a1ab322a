//! HTTP routes for the bot service

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::keyboard;
use crate::state::AppState;
use crate::telegram::TelegramUpdate;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "bot-service"
    }))
}

/// Receive a Telegram update.
///
/// Updates are queued per chat before responding, so Telegram's in-order
/// delivery carries through to the dialog. Replies are sent in the
/// background.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<TelegramUpdate>,
) -> StatusCode {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!("Rejected update {} with a bad secret token", update.update_id);
            return StatusCode::UNAUTHORIZED;
        }
    }

    let Some(decoded) = keyboard::decode_update(&update) else {
        debug!("Ignoring update {}", update.update_id);
        return StatusCode::OK;
    };

    info!(
        "Update {} from chat {}",
        update.update_id, decoded.inbound.conversation_id
    );

    if let Some(callback_id) = decoded.callback_id {
        let telegram = state.telegram.clone();
        tokio::spawn(async move {
            if let Err(e) = telegram.answer_callback_query(&callback_id).await {
                warn!("Failed to answer callback {}: {}", callback_id, e);
            }
        });
    }

    let chat_id = decoded.inbound.conversation_id;
    let reply = state.queue.enqueue(decoded.inbound).await;
    let telegram = state.telegram.clone();
    tokio::spawn(async move {
        match reply.await {
            Ok(outbound) => telegram.deliver(chat_id, &outbound).await,
            Err(_) => warn!("Reply for chat {} was dropped", chat_id),
        }
    });

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use booking::admission::AdmissionPolicy;
    use booking::clock::{Clock, FixedClock};
    use booking::dialog::{ConversationQueue, Dispatcher};
    use booking::intake::{InMemorySessionStore, SharedSessionStore};
    use booking::store::{InMemoryRecordStore, SharedStore};
    use booking::LifecycleManager;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::telegram::TelegramClient;

    fn state(secret: Option<&str>) -> AppState {
        let store: SharedStore = Arc::new(InMemoryRecordStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 5, 0, 0).unwrap(),
        ));
        let sessions: SharedSessionStore =
            Arc::new(InMemorySessionStore::new(chrono::Duration::minutes(30)));
        let lifecycle = LifecycleManager::new(store, AdmissionPolicy::default(), clock);
        let dispatcher = Arc::new(Dispatcher::new(lifecycle, sessions, false));

        AppState {
            queue: ConversationQueue::new(dispatcher, Duration::from_secs(5)),
            telegram: TelegramClient::new("http://127.0.0.1:9", "test"),
            webhook_secret: secret.map(str::to_string),
        }
    }

    fn start_update() -> TelegramUpdate {
        serde_json::from_str(
            r#"{"update_id": 1, "message": {"message_id": 1, "date": 0,
                "from": {"id": 42, "first_name": "Ann"},
                "chat": {"id": 42, "type": "private"}, "text": "/start"}}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_secret() {
        let state = state(Some("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static("wrong"));

        let status = telegram_webhook(State(state.clone()), headers, Json(start_update())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(state.queue.active_workers().await, 0);
    }

    #[tokio::test]
    async fn test_webhook_queues_update() {
        let state = state(Some("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static("s3cret"));

        let status = telegram_webhook(State(state.clone()), headers, Json(start_update())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.queue.active_workers().await, 1);
    }

    #[tokio::test]
    async fn test_webhook_ignores_updates_without_text() {
        let state = state(None);
        let update: TelegramUpdate = serde_json::from_str(r#"{"update_id": 2}"#).unwrap();

        let status = telegram_webhook(State(state.clone()), HeaderMap::new(), Json(update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.queue.active_workers().await, 0);
    }
}
