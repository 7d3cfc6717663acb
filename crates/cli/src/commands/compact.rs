use crate::state::{replay_locked, replay_policy};
use anyhow::{Context, Result};
use ghostcache_aof::{compaction, WriteBuffer};
use std::path::Path;

pub fn execute(path: &Path, skip_corrupt: bool) -> Result<()> {
    let (_lock, log, state, _) = replay_locked(path, replay_policy(skip_corrupt))?;
    let temp = log.temp_sibling();

    let report = compaction::compact(&state, &WriteBuffer::new(), &log, &temp)
        .with_context(|| format!("failed to compact '{}'", path.display()))?;

    println!(
        "{}: {} -> {} bytes, {} live keys",
        path.display(),
        report.bytes_before,
        report.bytes_after,
        report.live_keys
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghostcache_aof::{format, recovery, LogEntry, LogFile, ReplayPolicy};
    use crate::state::ReplayedState;
    use tempfile::TempDir;

    #[test]
    fn test_offline_compaction_preserves_state() {
        let temp_dir = TempDir::new().unwrap();
        let log = LogFile::new(temp_dir.path().join("aof.log"));
        let history: Vec<LogEntry> = (0..50)
            .map(|i| LogEntry::add(format!("k{}", i % 5), i.to_string(), None))
            .chain([LogEntry::remove("k0")])
            .collect();
        log.write_fresh(&format::encode_batch(&history).unwrap())
            .unwrap();
        let before = log.size().unwrap();

        execute(log.path(), false).unwrap();

        assert!(log.size().unwrap() < before);
        // The lock is released once the command returns
        drop(ghostcache_utils::LogLock::try_acquire(&log.lock_path()).unwrap());
        let state = ReplayedState::default();
        recovery::load(&state, &log, ReplayPolicy::Abort).unwrap();
        let entries = state.into_entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].key, "k1");
        assert_eq!(entries[0].value, "46");
    }

    #[test]
    fn test_missing_log_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(execute(&temp_dir.path().join("missing.log"), false).is_err());
    }
}
