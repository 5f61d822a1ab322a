//! Bot service configuration
//!
//! Read from `BOT_*` environment variables, e.g. `BOT_TELEGRAM_TOKEN`,
//! `BOT_SESSION_BACKEND=redis` or `BOT_UTC_OFFSET_MINUTES=300`.

use anyhow::{Result, anyhow};
use booking::admission::{
    AdmissionPolicy, DEFAULT_USER_DAILY_CEILING, DEFAULT_UTC_OFFSET_MINUTES,
};
use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Where intake sessions are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub telegram_token: String,

    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Expected `X-Telegram-Bot-Api-Secret-Token` header value
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default)]
    pub session_backend: SessionBackend,

    #[serde(default = "default_session_idle_seconds")]
    pub session_idle_seconds: u64,

    /// Cron expression (with seconds) for the idle session sweep
    #[serde(default = "default_sweep_schedule")]
    pub sweep_schedule: String,

    #[serde(default = "default_user_daily_ceiling")]
    pub user_daily_ceiling: u32,

    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Schedule completed bookings directly instead of sending them for review
    #[serde(default)]
    pub auto_schedule: bool,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:3002".to_string()
}

fn default_session_idle_seconds() -> u64 {
    1800
}

fn default_sweep_schedule() -> String {
    "0 * * * * *".to_string()
}

fn default_user_daily_ceiling() -> u32 {
    DEFAULT_USER_DAILY_CEILING
}

fn default_utc_offset_minutes() -> i32 {
    DEFAULT_UTC_OFFSET_MINUTES
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("BOT").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn admission_policy(&self) -> Result<AdmissionPolicy> {
        AdmissionPolicy::new(self.user_daily_ceiling, self.utc_offset_minutes).ok_or_else(|| {
            anyhow!(
                "BOT_UTC_OFFSET_MINUTES {} is not a valid UTC offset",
                self.utc_offset_minutes
            )
        })
    }

    pub fn session_idle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_idle_seconds as i64)
    }
}
