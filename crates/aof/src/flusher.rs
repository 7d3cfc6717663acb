//! Background flusher
//!
//! A single tokio task drives [`PersistenceManager::flush_now`] on a fixed
//! interval. Ticks never overlap: the next one is only awaited once the
//! blocking work of the current one has finished, and missed ticks are
//! skipped rather than bunched up. A failed tick is logged and leaves the
//! node degraded; the loop itself keeps running. The final tick run on
//! shutdown reports its error to [`Flusher::shutdown`].

use crate::errors::{AofError, RecoveryHint, Result};
use crate::manager::{PersistenceManager, TickOutcome};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Running flusher task
#[derive(Debug)]
pub struct Flusher {
    task: JoinHandle<Result<()>>,
    shutdown: watch::Sender<bool>,
}

impl Flusher {
    /// Start ticking on the current tokio runtime
    pub fn spawn(manager: PersistenceManager) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let period = manager.config().flush_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = run_tick(&manager).await {
                            tracing::error!(
                                "Persistence flush failed for {}: {}",
                                manager.log_path().display(),
                                e
                            );
                        }
                    }
                    // Either an explicit shutdown or every sender is gone
                    _ = shutdown_rx.changed() => break,
                }
            }

            tracing::debug!("Flusher stopping, writing final batch");
            run_tick(&manager).await.map(|_| ())
        });

        tracing::debug!("Started persistence flusher every {:?}", period);
        Self { task, shutdown }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop ticking and wait for the final flush.
    ///
    /// Returns the final flush's error, in which case the unwritten records
    /// are still in the buffer.
    pub async fn shutdown(self) -> Result<()> {
        // The receiver is gone only when the task already exited
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|e| task_failed("flusher task", e))?
    }
}

async fn run_tick(manager: &PersistenceManager) -> Result<TickOutcome> {
    let worker = manager.clone();
    let outcome = tokio::task::spawn_blocking(move || worker.flush_now())
        .await
        .map_err(|e| task_failed("flush tick", e))??;
    if let Some(report) = &outcome.compaction {
        tracing::debug!(
            "Tick compacted log to {} bytes ({} live keys)",
            report.bytes_after,
            report.live_keys
        );
    }
    Ok(outcome)
}

fn task_failed(what: &str, error: tokio::task::JoinError) -> AofError {
    AofError::BackgroundTask {
        message: format!("{what} failed: {error}"),
        recovery_hint: RecoveryHint::Manual {
            instructions: "check the process logs for the flusher panic".to_string(),
        },
    }
}
