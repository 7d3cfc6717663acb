//! In-memory cache double for unit tests

use crate::backend::{CacheBackend, RecordSink};
use crate::entry::{CacheEntry, LogEntry, Verb};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct MapCache {
    entries: Mutex<BTreeMap<String, CacheEntry>>,
    applied: Mutex<Vec<Verb>>,
    sink: Mutex<Option<Arc<dyn RecordSink>>>,
}

impl MapCache {
    /// Insert directly, bypassing any attached sink
    pub fn insert(&self, entry: CacheEntry) {
        self.entries.lock().insert(entry.key.clone(), entry);
    }

    /// Insert and record, the way a real cache mutation would
    pub fn put(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), CacheEntry::new(key, value, ttl));
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.record(LogEntry::add(key, value, ttl));
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn applied_verbs(&self) -> Vec<Verb> {
        self.applied.lock().clone()
    }

    pub fn has_sink(&self) -> bool {
        self.sink.lock().is_some()
    }
}

impl CacheBackend for MapCache {
    fn enumerate(&self) -> Vec<CacheEntry> {
        self.entries()
    }

    fn apply(&self, verb: Verb, key: &str, value: &str, ttl: Option<Duration>) {
        self.applied.lock().push(verb);
        let mut entries = self.entries.lock();
        match verb {
            Verb::Add => {
                entries.insert(key.to_string(), CacheEntry::new(key, value, ttl));
            }
            Verb::Remove | Verb::Expire => {
                entries.remove(key);
            }
            Verb::Flush => entries.clear(),
        }
    }

    fn attach_sink(&self, sink: Arc<dyn RecordSink>) {
        *self.sink.lock() = Some(sink);
    }
}
