use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::db::session_repo;

const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Daily sweep of superseded device sessions idle for 30 days.
pub fn spawn(db: PgPool, shutdown: Arc<Notify>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("session cleanup shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    match session_repo::delete_stale_sessions(&db).await {
                        Ok(0) => {}
                        Ok(removed) => info!(removed, "stale device sessions removed"),
                        Err(e) => warn!(error = %e, "session cleanup failed"),
                    }
                }
            }
        }
    });
}
