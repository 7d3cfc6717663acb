//! Persistence manager: owns the log, the buffer and the tick logic
//!
//! Every tick runs under a single flush lock, so appends and compactions
//! never overlap. The manager itself does no scheduling; see
//! [`crate::flusher`] for the periodic driver.

use crate::backend::{CacheBackend, RecordSink};
use crate::buffer::WriteBuffer;
use crate::compaction::{self, CompactionReport};
use crate::config::PersistenceConfig;
use crate::entry::LogEntry;
use crate::errors::Result;
use crate::format;
use crate::log_file::LogFile;
use crate::recovery::{self, RecoveryReport};
use crate::stats::{PersistenceStats, StatsSnapshot};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// What one flush tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Set when the tick compacted the log before appending
    pub compaction: Option<CompactionReport>,
    /// Records appended by this tick
    pub appended: usize,
    /// Log size after the tick
    pub log_size: u64,
}

/// Handle to the persistence state of one cache. Cheap to clone.
#[derive(Clone)]
pub struct PersistenceManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: PersistenceConfig,
    log: LogFile,
    temp: LogFile,
    buffer: Arc<WriteBuffer>,
    cache: Arc<dyn CacheBackend>,
    flush_lock: Mutex<()>,
    stats: PersistenceStats,
}

impl PersistenceManager {
    pub fn new(cache: Arc<dyn CacheBackend>, config: PersistenceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ManagerInner {
                log: LogFile::new(config.log_path()),
                temp: LogFile::new(config.temp_path()),
                config,
                buffer: Arc::new(WriteBuffer::new()),
                cache,
                flush_lock: Mutex::new(()),
                stats: PersistenceStats::default(),
            }),
        })
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.inner.config
    }

    pub fn log_path(&self) -> &Path {
        self.inner.log.path()
    }

    pub fn buffer(&self) -> &Arc<WriteBuffer> {
        &self.inner.buffer
    }

    /// The sink the cache should record its mutations into
    pub fn sink(&self) -> Arc<dyn RecordSink> {
        self.inner.buffer.clone()
    }

    /// Queue one record for the next tick
    pub fn enqueue(&self, entry: LogEntry) {
        self.inner.buffer.enqueue(entry);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Replay the log into the cache.
    ///
    /// A temp file left behind by an interrupted compaction is discarded
    /// first; the active log is always the authoritative copy.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let _guard = self.inner.flush_lock.lock();

        if self.inner.temp.exists() {
            tracing::warn!(
                "Removing stale compaction file {}",
                self.inner.temp.path().display()
            );
            self.inner.temp.remove()?;
        }

        let report = recovery::load(
            &*self.inner.cache,
            &self.inner.log,
            self.inner.config.replay_policy,
        )?;
        self.inner.stats.record_log_size(report.log_size);
        Ok(report)
    }

    /// Run one flush tick.
    ///
    /// An oversized or missing log is compacted first. Buffered records are
    /// then appended in one write. When the append fails the batch goes back
    /// to the buffer for the next tick. When only the compaction fails the
    /// batch is still appended to the existing log before the error is
    /// returned.
    pub fn flush_now(&self) -> Result<TickOutcome> {
        let inner = &*self.inner;
        let _guard = inner.flush_lock.lock();
        inner.stats.record_tick();

        let size = if inner.log.exists() {
            Some(inner.log.size().inspect_err(|_| inner.stats.record_error())?)
        } else {
            tracing::warn!(
                "Log {} disappeared, rebuilding it from the cache",
                inner.log.path().display()
            );
            None
        };

        let mut outcome = TickOutcome::default();
        let mut compaction_error = None;
        if size.map_or(true, |s| s > inner.config.max_log_size) {
            match compaction::compact(&*inner.cache, &inner.buffer, &inner.log, &inner.temp) {
                Ok(report) => {
                    inner.stats.record_compaction(report.bytes_after);
                    outcome.log_size = report.bytes_after;
                    outcome.compaction = Some(report);
                }
                Err(e) => {
                    tracing::warn!("Compaction failed, keeping current log: {}", e);
                    compaction_error = Some(e);
                }
            }
        } else {
            outcome.log_size = size.unwrap_or_default();
        }

        let batch = inner.buffer.drain();
        if !batch.is_empty() {
            let bytes = match format::encode_batch(&batch) {
                Ok(bytes) => bytes,
                Err(e) => {
                    inner.buffer.restore(batch);
                    inner.stats.record_error();
                    return Err(e);
                }
            };
            match inner.log.append(&bytes, inner.config.sync_writes) {
                Ok(new_size) => {
                    inner.stats.record_append(batch.len(), bytes.len(), new_size);
                    outcome.appended = batch.len();
                    outcome.log_size = new_size;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to append {} records, retrying next tick: {}",
                        batch.len(),
                        e
                    );
                    inner.buffer.restore(batch);
                    inner.stats.record_error();
                    return Err(e);
                }
            }
        }

        if let Some(e) = compaction_error {
            inner.stats.record_error();
            return Err(e);
        }

        inner.stats.clear_degraded();
        tracing::trace!(
            appended = outcome.appended,
            log_size = outcome.log_size,
            "Flush tick complete"
        );
        Ok(outcome)
    }

    /// Compact immediately regardless of size.
    ///
    /// Buffered records are covered by the snapshot and leave the buffer.
    pub fn compact_now(&self) -> Result<CompactionReport> {
        let inner = &*self.inner;
        let _guard = inner.flush_lock.lock();
        match compaction::compact(&*inner.cache, &inner.buffer, &inner.log, &inner.temp) {
            Ok(report) => {
                inner.stats.record_compaction(report.bytes_after);
                Ok(report)
            }
            Err(e) => {
                inner.stats.record_error();
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("log", &self.inner.log.path())
            .field("pending", &self.inner.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplayPolicy;
    use crate::entry::CacheEntry;
    use crate::testing::MapCache;
    use std::fs;
    use tempfile::TempDir;

    fn manager(temp_dir: &TempDir, max_log_size: u64) -> (Arc<MapCache>, PersistenceManager) {
        let cache = Arc::new(MapCache::default());
        let config = PersistenceConfig::builder()
            .with_log_dir(temp_dir.path())
            .with_max_log_size(max_log_size)
            .build()
            .unwrap();
        let manager = PersistenceManager::new(cache.clone(), config).unwrap();
        cache.attach_sink(manager.sink());
        (cache, manager)
    }

    fn replayed(manager: &PersistenceManager) -> Vec<CacheEntry> {
        let fresh = MapCache::default();
        recovery::load(
            &fresh,
            &LogFile::new(manager.log_path()),
            ReplayPolicy::Abort,
        )
        .unwrap();
        fresh.entries()
    }

    #[test]
    fn test_flush_appends_buffered_records() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, manager) = manager(&temp_dir, 1024 * 1024);
        manager.recover().unwrap();

        cache.put("a", "1", None);
        cache.put("b", "2", None);
        let outcome = manager.flush_now().unwrap();

        assert_eq!(outcome.appended, 2);
        assert!(outcome.compaction.is_none());
        assert!(manager.buffer().is_empty());
        assert_eq!(replayed(&manager), cache.entries());
        assert_eq!(manager.stats().entries_appended, 2);
    }

    #[test]
    fn test_empty_tick_leaves_log_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let (_cache, manager) = manager(&temp_dir, 1024 * 1024);
        manager.recover().unwrap();
        let before = fs::read(manager.log_path()).unwrap();

        let outcome = manager.flush_now().unwrap();

        assert_eq!(outcome.appended, 0);
        assert_eq!(fs::read(manager.log_path()).unwrap(), before);
    }

    #[test]
    fn test_oversized_log_compacts_before_append() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, manager) = manager(&temp_dir, 1024);
        manager.recover().unwrap();

        for i in 0..100 {
            cache.put("a", &i.to_string(), None);
            manager.flush_now().unwrap();
        }
        // Records queued while the log is over the threshold
        cache.put("b", "late", None);
        let size = fs::metadata(manager.log_path()).unwrap().len();
        assert!(size <= 1024 + 200);

        manager.flush_now().unwrap();

        assert!(manager.stats().compactions > 0);
        assert_eq!(replayed(&manager), cache.entries());
    }

    #[test]
    fn test_failed_append_restores_batch() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, manager) = manager(&temp_dir, 1024 * 1024);
        manager.recover().unwrap();

        // A directory in place of the log makes the append fail
        fs::remove_file(manager.log_path()).unwrap();
        fs::create_dir(manager.log_path()).unwrap();

        cache.put("a", "1", None);
        assert!(manager.flush_now().is_err());
        assert_eq!(manager.buffer().len(), 1);
        assert!(manager.stats().degraded);

        fs::remove_dir(manager.log_path()).unwrap();
        LogFile::new(manager.log_path()).create().unwrap();
        manager.flush_now().unwrap();

        assert!(!manager.stats().degraded);
        assert_eq!(replayed(&manager), cache.entries());
    }

    #[test]
    fn test_deleted_log_is_rebuilt_from_cache() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, manager) = manager(&temp_dir, 1024 * 1024);
        manager.recover().unwrap();
        cache.put("a", "1", None);
        manager.flush_now().unwrap();

        fs::remove_file(manager.log_path()).unwrap();
        cache.put("b", "2", None);
        let outcome = manager.flush_now().unwrap();

        assert!(outcome.compaction.is_some());
        assert_eq!(replayed(&manager), cache.entries());
    }

    #[test]
    fn test_recover_discards_stale_temp() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, manager) = manager(&temp_dir, 1024 * 1024);
        let temp = manager.config().temp_path();
        fs::write(&temp, b"half a compaction").unwrap();

        manager.recover().unwrap();

        assert!(!temp.exists());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compact_now_subsumes_buffered_records() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, manager) = manager(&temp_dir, 1024 * 1024);
        manager.recover().unwrap();
        cache.put("a", "1", None);
        manager.flush_now().unwrap();

        cache.put("a", "2", None);
        cache.put("b", "3", None);
        let report = manager.compact_now().unwrap();
        assert_eq!(report.live_keys, 2);
        assert_eq!(report.subsumed, 2);
        assert!(manager.buffer().is_empty());

        assert_eq!(replayed(&manager), cache.entries());
    }
}
