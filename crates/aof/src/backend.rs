//! Seams between the persistence layer and the cache it protects

use crate::entry::{CacheEntry, LogEntry, Verb};
use std::sync::Arc;
use std::time::Duration;

/// The narrow view of the cache that persistence needs.
///
/// `enumerate` feeds compaction and `apply` feeds replay. `apply` must not
/// record the mutation again.
pub trait CacheBackend: Send + Sync {
    /// Snapshot of every live entry
    fn enumerate(&self) -> Vec<CacheEntry>;

    /// Run `quiesce` and take a snapshot with no mutation landing in between.
    ///
    /// Compaction drains the write buffer from `quiesce` and drops what it
    /// drained, so every drained record must be reflected in the snapshot.
    /// The default drains first and enumerates second. A mutation landing
    /// between the two then shows up in both the snapshot and the buffer,
    /// which replay tolerates unless the cache evicts on capacity. Caches
    /// that can hold their own lock across both steps should override this.
    fn snapshot_with(&self, quiesce: &mut dyn FnMut()) -> Vec<CacheEntry> {
        quiesce();
        self.enumerate()
    }

    /// Apply one replayed mutation
    fn apply(&self, verb: Verb, key: &str, value: &str, ttl: Option<Duration>);

    /// Start sending mutation records to `sink`.
    ///
    /// Called once replay has finished and before the flusher starts.
    fn attach_sink(&self, _sink: Arc<dyn RecordSink>) {}
}

impl<T: CacheBackend + ?Sized> CacheBackend for Arc<T> {
    fn enumerate(&self) -> Vec<CacheEntry> {
        (**self).enumerate()
    }

    fn snapshot_with(&self, quiesce: &mut dyn FnMut()) -> Vec<CacheEntry> {
        (**self).snapshot_with(quiesce)
    }

    fn apply(&self, verb: Verb, key: &str, value: &str, ttl: Option<Duration>) {
        (**self).apply(verb, key, value, ttl)
    }

    fn attach_sink(&self, sink: Arc<dyn RecordSink>) {
        (**self).attach_sink(sink)
    }
}

/// Destination for mutation records produced by the cache.
///
/// Implementations must be cheap and non-blocking; disk I/O happens elsewhere.
pub trait RecordSink: Send + Sync {
    fn record(&self, entry: LogEntry);
}

impl<T: RecordSink + ?Sized> RecordSink for Arc<T> {
    fn record(&self, entry: LogEntry) {
        (**self).record(entry)
    }
}
