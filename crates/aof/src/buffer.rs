//! Write buffer between cache mutations and the flusher
//!
//! Producers push records under a mutex; the flusher takes the whole pending
//! sequence in one swap. A batch whose append failed goes back to the front
//! so ordering survives a retry.

use crate::backend::RecordSink;
use crate::entry::LogEntry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ordered pending records awaiting a durable append
#[derive(Debug, Default)]
pub struct WriteBuffer {
    pending: Mutex<VecDeque<LogEntry>>,
    enqueued: AtomicU64,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one record
    pub fn enqueue(&self, entry: LogEntry) {
        self.pending.lock().push_back(entry);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Take every pending record, oldest first.
    ///
    /// Records queued after the swap are left for the next drain.
    pub fn drain(&self) -> Vec<LogEntry> {
        let taken = std::mem::take(&mut *self.pending.lock());
        Vec::from(taken)
    }

    /// Put a batch that could not be persisted back in front of anything
    /// queued since it was drained
    pub fn restore(&self, batch: Vec<LogEntry>) {
        if batch.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        let newer = std::mem::take(&mut *pending);
        pending.extend(batch);
        pending.extend(newer);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Total records ever queued
    pub fn total_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }
}

impl RecordSink for WriteBuffer {
    fn record(&self, entry: LogEntry) {
        self.enqueue(entry);
    }
}
