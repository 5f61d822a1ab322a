use anyhow::Result;
use booking::clock::{Clock, SystemClock};
use booking::store::{PgRecordStore, SharedStore, postgres::migrate};
use booking::{LifecycleManager, Reporter};
use common::database::{DatabaseConfig, health_check, init_pool};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod middleware;
mod models;
mod routes;
mod state;

use crate::{config::ApiConfig, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting API service");

    let config = ApiConfig::from_env()?;
    let policy = config.admission_policy()?;
    let decoding_key = config.decoding_key()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    migrate(&pool).await?;

    let store: SharedStore = Arc::new(PgRecordStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let app_state = AppState {
        lifecycle: LifecycleManager::new(store.clone(), policy, clock.clone()),
        reporter: Reporter::new(store, clock, policy.reference_offset),
        decoding_key: Arc::new(decoding_key),
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("API service listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
