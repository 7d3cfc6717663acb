//! Boot entry point and the handle that owns a running persistence layer

use crate::backend::{CacheBackend, RecordSink};
use crate::config::PersistenceConfig;
use crate::errors::{AofError, RecoveryHint, Result};
use crate::flusher::Flusher;
use crate::manager::PersistenceManager;
use crate::recovery::RecoveryReport;
use crate::stats::StatsSnapshot;
use ghostcache_utils::log_lock::{LockError, LogLock};
use std::sync::Arc;

/// Running persistence for one cache.
///
/// Owns the log lock and the flusher. Call [`PersistenceHandle::shutdown`]
/// before exit so buffered records reach disk; dropping the handle stops the
/// flusher after one last tick but does not wait for it.
#[derive(Debug)]
pub struct PersistenceHandle {
    manager: PersistenceManager,
    flusher: Flusher,
    recovery: RecoveryReport,
    _lock: LogLock,
}

impl PersistenceHandle {
    pub fn manager(&self) -> &PersistenceManager {
        &self.manager
    }

    pub fn sink(&self) -> Arc<dyn RecordSink> {
        self.manager.sink()
    }

    /// What boot-time replay found
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.manager.stats()
    }

    /// Stop the flusher, write out everything still buffered and release
    /// the log lock.
    ///
    /// Fails with the final flush's error when buffered records could not be
    /// written; the lock is released either way.
    pub async fn shutdown(self) -> Result<StatsSnapshot> {
        let Self {
            manager,
            flusher,
            _lock: lock,
            ..
        } = self;
        flusher.shutdown().await?;
        let stats = manager.stats();
        tracing::info!(
            "Persistence for {} stopped after {} records",
            manager.log_path().display(),
            stats.entries_appended
        );
        drop(lock);
        Ok(stats)
    }
}

/// Bring persistence up for `cache`.
///
/// Takes the log lock, replays the log into the cache, attaches the write
/// buffer to the cache and starts the flusher. Must run before the cache
/// accepts writes. A second call for the same log while the first handle is
/// alive fails with [`AofError::AlreadyRunning`].
pub async fn initialize_persistence<C>(
    cache: Arc<C>,
    config: PersistenceConfig,
) -> Result<PersistenceHandle>
where
    C: CacheBackend + 'static,
{
    config.validate()?;
    let lock = LogLock::try_acquire(&config.lock_path()).map_err(|e| lock_error(&config, e))?;

    let cache: Arc<dyn CacheBackend> = cache;
    let manager = PersistenceManager::new(cache.clone(), config)?;

    let worker = manager.clone();
    let recovery = tokio::task::spawn_blocking(move || worker.recover())
        .await
        .map_err(|e| AofError::BackgroundTask {
            message: format!("recovery task failed: {e}"),
            recovery_hint: RecoveryHint::Manual {
                instructions: "inspect the log with `ghostcache inspect`".to_string(),
            },
        })??;

    cache.attach_sink(manager.sink());
    let flusher = Flusher::spawn(manager.clone());

    tracing::info!(
        "Persistence ready at {} ({} records replayed)",
        manager.log_path().display(),
        recovery.applied
    );

    Ok(PersistenceHandle {
        manager,
        flusher,
        recovery,
        _lock: lock,
    })
}

fn lock_error(config: &PersistenceConfig, error: LockError) -> AofError {
    match error {
        LockError::Held { pid, .. } => AofError::AlreadyRunning {
            path: config.log_path(),
            pid,
            recovery_hint: RecoveryHint::StopOtherInstance { pid },
        },
        LockError::Io { path, source } => AofError::io(&path, "acquire log lock", source),
    }
}
