//! Bounded LRU store that records every mutation for persistence

use ghostcache_aof::{CacheBackend, CacheEntry, LogEntry, RecordSink, Verb};
use parking_lot::{Mutex, RwLock};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Time left, rounded up to whole seconds
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| {
            let left = at.saturating_duration_since(now);
            let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
            Duration::from_secs(secs)
        })
    }
}

/// In-memory LRU cache.
///
/// Every mutation updates the map and is handed to the attached
/// [`RecordSink`] while the map lock is held, so sink order always matches
/// the order mutations took effect. Entries pushed out by the capacity limit
/// are recorded as `remove`; entries found expired on read as `expire`.
pub struct LruCache {
    entries: Mutex<lru::LruCache<String, StoredValue>>,
    sink: RwLock<Option<Arc<dyn RecordSink>>>,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(lru::LruCache::new(capacity)),
            sink: RwLock::new(None),
        }
    }

    pub fn with_sink(capacity: usize, sink: Arc<dyn RecordSink>) -> Self {
        let cache = Self::new(capacity);
        *cache.sink.write() = Some(sink);
        cache
    }

    fn record(&self, entry: LogEntry) {
        if let Some(sink) = self.sink.read().as_ref() {
            sink.record(entry);
        }
    }

    /// Insert or overwrite `key`, returning the previous live value
    pub fn put(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Option<String> {
        let mut entries = self.entries.lock();
        self.insert_locked(&mut entries, key.into(), value.into(), ttl)
    }

    /// Insert only when `key` has no live value. Returns whether it inserted.
    pub fn add(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> bool {
        let key = key.into();
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.peek(&key) {
            if !existing.is_expired(Instant::now()) {
                return false;
            }
            entries.pop(&key);
            self.record(LogEntry::expire(key.as_str()));
        }
        self.insert_locked(&mut entries, key, value.into(), ttl);
        true
    }

    fn insert_locked(
        &self,
        entries: &mut lru::LruCache<String, StoredValue>,
        key: String,
        value: String,
        ttl: Option<Duration>,
    ) -> Option<String> {
        let previous = match entries.pop(&key) {
            Some(old) if !old.is_expired(Instant::now()) => Some(old.value),
            _ => None,
        };
        if let Some((evicted, _)) = entries.push(key.clone(), StoredValue::new(value.clone(), ttl))
        {
            tracing::trace!("Evicted {} to make room for {}", evicted, key);
            self.record(LogEntry::remove(evicted));
        }
        self.record(LogEntry::add(key, value, ttl));
        previous
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        let expired = entries.peek(key)?.is_expired(Instant::now());
        if expired {
            entries.pop(key);
            self.record(LogEntry::expire(key));
            return None;
        }
        entries.get(key).map(|stored| stored.value.clone())
    }

    /// Remove `key`. Returns whether a live value was removed.
    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.pop(key) {
            Some(stored) => {
                self.record(LogEntry::remove(key));
                !stored.is_expired(Instant::now())
            }
            None => false,
        }
    }

    /// Drop every entry
    pub fn flush(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.record(LogEntry::flush());
    }

    /// Drop expired entries, recording an `expire` for each
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, stored)| stored.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
            self.record(LogEntry::expire(key.as_str()));
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

fn live_entries(entries: &lru::LruCache<String, StoredValue>) -> Vec<CacheEntry> {
    let now = Instant::now();
    entries
        .iter()
        .filter(|(_, stored)| !stored.is_expired(now))
        .map(|(key, stored)| {
            CacheEntry::new(key.as_str(), stored.value.as_str(), stored.remaining(now))
        })
        .collect()
}

impl CacheBackend for LruCache {
    fn enumerate(&self) -> Vec<CacheEntry> {
        live_entries(&self.entries.lock())
    }

    /// Holds the map lock across `quiesce`, so no mutation can land between
    /// the buffer drain and the snapshot
    fn snapshot_with(&self, quiesce: &mut dyn FnMut()) -> Vec<CacheEntry> {
        let entries = self.entries.lock();
        quiesce();
        live_entries(&entries)
    }

    fn apply(&self, verb: Verb, key: &str, value: &str, ttl: Option<Duration>) {
        let mut entries = self.entries.lock();
        match verb {
            Verb::Add => {
                entries.put(key.to_string(), StoredValue::new(value.to_string(), ttl));
            }
            Verb::Remove | Verb::Expire => {
                entries.pop(key);
            }
            Verb::Flush => entries.clear(),
        }
    }

    fn attach_sink(&self, sink: Arc<dyn RecordSink>) {
        *self.sink.write() = Some(sink);
    }
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("persistent", &self.sink.read().is_some())
            .finish()
    }
}
