//! Log compaction
//!
//! A compaction writes the cache's current state, one `add` per live key, to
//! the temp file and renames it over the active log. Until the rename lands
//! the old log is untouched, so a crash at any point leaves one complete log.
//!
//! The write buffer is quiesced for the snapshot: it is drained inside
//! [`CacheBackend::snapshot_with`], and the drained records are dropped once
//! the rename succeeds because the snapshot already reflects them. Records
//! queued after the snapshot stay in the buffer and are appended to the new
//! log by the same tick. If compaction fails the drained records go back to
//! the front of the buffer.

use crate::backend::CacheBackend;
use crate::buffer::WriteBuffer;
use crate::entry::LogEntry;
use crate::errors::Result;
use crate::format;
use crate::log_file::LogFile;
use chrono::Utc;

/// Outcome of one compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub live_keys: usize,
    /// Buffered records made redundant by the snapshot
    pub subsumed: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Rewrite `log` as a snapshot of `cache`, staging through `temp`
#[tracing::instrument(level = "debug", skip_all, fields(path = %log.path().display()))]
pub fn compact<C>(
    cache: &C,
    pending: &WriteBuffer,
    log: &LogFile,
    temp: &LogFile,
) -> Result<CompactionReport>
where
    C: CacheBackend + ?Sized,
{
    let bytes_before = if log.exists() { log.size()? } else { 0 };

    let mut subsumed = Vec::new();
    let mut snapshot = cache.snapshot_with(&mut || subsumed = pending.drain());
    snapshot.sort_by(|a, b| a.key.cmp(&b.key));
    let live_keys = snapshot.len();

    let now = Utc::now();
    let records: Vec<LogEntry> = snapshot
        .into_iter()
        .map(|entry| LogEntry {
            timestamp: now,
            ..LogEntry::from(entry)
        })
        .collect();

    if let Err(e) = write_and_swap(&records, log, temp) {
        pending.restore(subsumed);
        return Err(e);
    }

    let bytes_after = log.size()?;
    tracing::info!(
        "Compacted {} from {} to {} bytes ({} live keys)",
        log.path().display(),
        bytes_before,
        bytes_after,
        live_keys
    );

    Ok(CompactionReport {
        live_keys,
        subsumed: subsumed.len(),
        bytes_before,
        bytes_after,
    })
}

fn write_and_swap(records: &[LogEntry], log: &LogFile, temp: &LogFile) -> Result<()> {
    let body = format::encode_batch(records)?;
    let written = temp
        .write_fresh(&body)
        .and_then(|()| temp.atomic_replace(log));
    if written.is_err() {
        discard_temp(temp);
    }
    written
}

fn discard_temp(temp: &LogFile) {
    if let Err(e) = temp.remove() {
        tracing::warn!(
            "Failed to remove compaction temp file {}: {}",
            temp.path().display(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordSink;
    use crate::config::ReplayPolicy;
    use crate::entry::{CacheEntry, Verb};
    use crate::recovery;
    use crate::testing::MapCache;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn paths(temp_dir: &TempDir) -> (LogFile, LogFile) {
        (
            LogFile::new(temp_dir.path().join("aof.log")),
            LogFile::new(temp_dir.path().join("temp_aof.log")),
        )
    }

    #[test]
    fn test_compaction_keeps_one_record_per_key() {
        let temp_dir = TempDir::new().unwrap();
        let (log, temp) = paths(&temp_dir);

        let history: Vec<LogEntry> = (0..100)
            .map(|i| LogEntry::add("a", i.to_string(), None))
            .collect();
        log.write_fresh(&format::encode_batch(&history).unwrap())
            .unwrap();

        let cache = MapCache::default();
        recovery::load(&cache, &log, ReplayPolicy::Abort).unwrap();

        let report = compact(&cache, &WriteBuffer::new(), &log, &temp).unwrap();

        assert_eq!(report.live_keys, 1);
        assert!(report.bytes_after < report.bytes_before);
        assert!(!temp.exists());

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(format::is_header(lines[0]));
        let record = format::decode_entry(lines[1]).unwrap();
        assert_eq!(record.verb, Verb::Add);
        assert_eq!(record.key, "a");
        assert_eq!(record.value, "99");
    }

    #[test]
    fn test_compaction_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let (log, temp) = paths(&temp_dir);
        log.create().unwrap();

        let cache = MapCache::default();
        cache.insert(CacheEntry::new("b", "2", Some(Duration::from_secs(30))));
        cache.insert(CacheEntry::new("a", "1", None));

        compact(&cache, &WriteBuffer::new(), &log, &temp).unwrap();
        let first = MapCache::default();
        recovery::load(&first, &log, ReplayPolicy::Abort).unwrap();

        compact(&cache, &WriteBuffer::new(), &log, &temp).unwrap();
        let second = MapCache::default();
        recovery::load(&second, &log, ReplayPolicy::Abort).unwrap();

        assert_eq!(first.entries(), second.entries());
        assert_eq!(first.entries(), cache.entries());
    }

    #[test]
    fn test_compaction_of_empty_cache_leaves_header() {
        let temp_dir = TempDir::new().unwrap();
        let (log, temp) = paths(&temp_dir);
        log.write_fresh(
            &format::encode_batch(&[LogEntry::add("x", "1", None), LogEntry::remove("x")])
                .unwrap(),
        )
        .unwrap();

        let report = compact(&MapCache::default(), &WriteBuffer::new(), &log, &temp).unwrap();

        assert_eq!(report.live_keys, 0);
        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_buffered_records_are_subsumed() {
        let temp_dir = TempDir::new().unwrap();
        let (log, temp) = paths(&temp_dir);
        log.create().unwrap();

        let buffer = Arc::new(WriteBuffer::new());
        let cache = MapCache::default();
        cache.attach_sink(buffer.clone());
        cache.put("a", "1", None);
        cache.put("a", "2", None);

        let report = compact(&cache, &buffer, &log, &temp).unwrap();

        assert_eq!(report.subsumed, 2);
        assert!(buffer.is_empty());
        let replayed = MapCache::default();
        recovery::load(&replayed, &log, ReplayPolicy::Abort).unwrap();
        assert_eq!(replayed.entries(), cache.entries());
    }

    #[test]
    fn test_failed_temp_write_leaves_log_intact() {
        let temp_dir = TempDir::new().unwrap();
        let log = LogFile::new(temp_dir.path().join("aof.log"));
        log.write_fresh(&format::encode_batch(&[LogEntry::add("k", "v", None)]).unwrap())
            .unwrap();
        let before = fs::read(log.path()).unwrap();

        // A directory where the temp file should go makes the write fail
        let temp_path = temp_dir.path().join("temp_aof.log");
        fs::create_dir(&temp_path).unwrap();
        let temp = LogFile::new(&temp_path);

        let buffer = WriteBuffer::new();
        buffer.record(LogEntry::add("other", "state", None));
        let cache = MapCache::default();
        cache.insert(CacheEntry::new("other", "state", None));

        assert!(compact(&cache, &buffer, &log, &temp).is_err());

        assert_eq!(fs::read(log.path()).unwrap(), before);
        assert_eq!(buffer.len(), 1);
    }
}
