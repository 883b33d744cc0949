use crate::app::uploads::purge_expired;
use crate::app::AppResult;
use crate::infra::storage::FileStorage;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

/// Deletes uploads that sat in quarantine longer than the configured TTL.
pub struct QuarantineCleanupWorker {
    pool: PgPool,
    storage: FileStorage,
    ttl_secs: i64,
    period: Duration,
    shutdown: Arc<Notify>,
}

impl QuarantineCleanupWorker {
    pub fn new(pool: PgPool, storage: FileStorage, ttl_secs: i64, period_secs: u64) -> Self {
        Self {
            pool,
            storage,
            ttl_secs,
            period: Duration::from_secs(period_secs.max(1)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn run_once(&self) -> AppResult<usize> {
        let purged = purge_expired(&self.pool, &self.storage, self.ttl_secs).await?;
        if purged > 0 {
            info!(purged, ttl_secs = self.ttl_secs, "expired quarantine uploads removed");
        }
        Ok(purged)
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let shutdown = self.shutdown.clone();
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "quarantine cleanup failed");
                        }
                    }
                    _ = shutdown.notified() => {
                        debug!("quarantine cleanup worker shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
