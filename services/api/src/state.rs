//! Application state shared across handlers

use booking::{LifecycleManager, Reporter};
use jsonwebtoken::DecodingKey;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: LifecycleManager,
    pub reporter: Reporter,
    /// Loaded once at startup
    pub decoding_key: Arc<DecodingKey>,
}
