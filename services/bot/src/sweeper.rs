//! Periodic removal of idle intake sessions

use anyhow::Result;
use booking::clock::Clock;
use booking::intake::{SessionStore, SharedSessionStore};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

/// Start the sweep job. The returned scheduler must be kept alive.
pub async fn start_session_sweeper(
    sessions: SharedSessionStore,
    clock: Arc<dyn Clock>,
    schedule: &str,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _l| {
        let sessions = sessions.clone();
        let clock = clock.clone();
        Box::pin(async move {
            match sessions.purge_expired(clock.now()).await {
                Ok(0) => debug!("No idle intake sessions to purge"),
                Ok(purged) => info!("Purged {} idle intake sessions", purged),
                Err(e) => error!("Error purging intake sessions: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!("Session sweeper started with schedule: {}", schedule);
    Ok(scheduler)
}
