//! Counters describing the persistence layer's activity

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct PersistenceStats {
    ticks: AtomicU64,
    entries_appended: AtomicU64,
    bytes_appended: AtomicU64,
    compactions: AtomicU64,
    write_errors: AtomicU64,
    degraded: AtomicBool,
    last_log_size: AtomicU64,
}

/// Point-in-time copy of the persistence counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub entries_appended: u64,
    pub bytes_appended: u64,
    pub compactions: u64,
    pub write_errors: u64,
    /// The most recent tick failed to persist everything it should have
    pub degraded: bool,
    pub last_log_size: u64,
}

impl PersistenceStats {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_append(&self, entries: usize, bytes: usize, log_size: u64) {
        self.entries_appended
            .fetch_add(entries as u64, Ordering::Relaxed);
        self.bytes_appended
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_log_size.store(log_size, Ordering::Relaxed);
    }

    pub fn record_compaction(&self, log_size: u64) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.last_log_size.store(log_size, Ordering::Relaxed);
    }

    pub fn record_log_size(&self, log_size: u64) {
        self.last_log_size.store(log_size, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
        self.degraded.store(true, Ordering::Relaxed);
    }

    pub fn clear_degraded(&self) {
        self.degraded.store(false, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            entries_appended: self.entries_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            last_log_size: self.last_log_size.load(Ordering::Relaxed),
        }
    }
}
