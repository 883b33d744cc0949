use crate::app::moderation::{pending_batch, ModerationPipeline};
use crate::app::AppResult;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const BATCH_SIZE: i64 = 50;
/// Fresh content is still being moderated inline by the request that created it.
pub const MIN_AGE_SECS: i64 = 10;

/// Retries classification of topics and comments left pending.
pub struct ModerationQueueWorker {
    pool: PgPool,
    pipeline: ModerationPipeline,
    period: Duration,
    shutdown: Arc<Notify>,
}

impl ModerationQueueWorker {
    pub fn new(pool: PgPool, pipeline: ModerationPipeline, period_secs: u64) -> Self {
        Self {
            pool,
            pipeline,
            period: Duration::from_secs(period_secs.max(1)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// One pass over the queue. Returns how many items were settled; a failing
    /// item is logged and left for the next pass.
    pub async fn run_once(&self) -> AppResult<usize> {
        let batch = pending_batch(&self.pool, BATCH_SIZE, MIN_AGE_SECS).await?;
        let mut settled = 0;
        for item in &batch {
            match self
                .pipeline
                .moderate(&self.pool, item.target_type, item.id, &item.text)
                .await
            {
                Ok(Some(_)) => settled += 1,
                Ok(None) => {}
                Err(e) => warn!(
                    target_type = %item.target_type,
                    target_id = item.id,
                    error = %e,
                    "moderation of queued item failed"
                ),
            }
        }
        if !batch.is_empty() {
            info!(pending = batch.len(), settled, "moderation queue pass");
        }
        Ok(settled)
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
                            error!(error = %e, "moderation queue pass failed");
                        }
                    }
                    _ = shutdown.notified() => {
                        debug!("moderation queue worker shutting down");
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
