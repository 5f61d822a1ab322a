use anyhow::Result;
use booking::clock::{Clock, SystemClock};
use booking::dialog::{ConversationQueue, Dispatcher};
use booking::intake::{InMemorySessionStore, RedisSessionStore, SharedSessionStore};
use booking::store::{PgRecordStore, SharedStore, postgres::migrate};
use booking::LifecycleManager;
use common::cache::{RedisConfig, RedisPool};
use common::database::{DatabaseConfig, health_check, init_pool};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod keyboard;
mod routes;
mod state;
mod sweeper;
mod telegram;

use config::{BotConfig, SessionBackend};
use state::AppState;
use telegram::TelegramClient;

/// How long a chat's worker waits for new updates before exiting
const WORKER_IDLE: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting booking bot service");

    let config = BotConfig::from_env()?;
    let policy = config.admission_policy()?;

    // Initialize database connection
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if !health_check(&pool).await? {
        anyhow::bail!("Database health check failed");
    }
    migrate(&pool).await?;
    info!("Database connection established");

    let store: SharedStore = Arc::new(PgRecordStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sessions: SharedSessionStore = match config.session_backend {
        SessionBackend::Memory => Arc::new(InMemorySessionStore::new(config.session_idle())),
        SessionBackend::Redis => {
            let redis = RedisPool::new(&RedisConfig::from_env()?).await?;
            if !redis.health_check().await? {
                anyhow::bail!("Redis health check failed");
            }
            Arc::new(RedisSessionStore::new(redis, config.session_idle()))
        }
    };
    info!("Intake sessions kept in {:?} backend", config.session_backend);

    let lifecycle = LifecycleManager::new(store, policy, clock.clone());
    let dispatcher = Arc::new(Dispatcher::new(
        lifecycle,
        sessions.clone(),
        config.auto_schedule,
    ));
    let queue = ConversationQueue::new(dispatcher, WORKER_IDLE);

    let _sweeper = sweeper::start_session_sweeper(sessions, clock, &config.sweep_schedule).await?;

    let state = AppState {
        queue,
        telegram: TelegramClient::new(&config.telegram_api_url, &config.telegram_token),
        webhook_secret: config.webhook_secret.clone(),
    };

    let app = routes::create_router(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("Bot service listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
