//! Offline replay target for the log tools

use anyhow::{Context, Result};
use ghostcache_aof::{
    recovery, CacheBackend, CacheEntry, LogFile, RecoveryReport, ReplayPolicy, Verb,
};
use ghostcache_utils::log_lock::LogLock;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Unbounded, key-ordered map the offline tools replay into
#[derive(Debug, Default)]
pub struct ReplayedState {
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl ReplayedState {
    pub fn into_entries(self) -> Vec<CacheEntry> {
        self.entries.into_inner().into_values().collect()
    }
}

impl CacheBackend for ReplayedState {
    fn enumerate(&self) -> Vec<CacheEntry> {
        self.entries.lock().values().cloned().collect()
    }

    fn apply(&self, verb: Verb, key: &str, value: &str, ttl: Option<Duration>) {
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
}

pub fn replay_policy(skip_corrupt: bool) -> ReplayPolicy {
    if skip_corrupt {
        ReplayPolicy::Skip
    } else {
        ReplayPolicy::Abort
    }
}

/// Lock `path` against a running node and replay it.
///
/// Replay repairs the file the same way boot does: an interrupted final
/// record is cut off.
pub fn replay_locked(
    path: &Path,
    policy: ReplayPolicy,
) -> Result<(LogLock, LogFile, ReplayedState, RecoveryReport)> {
    let log = LogFile::new(path);
    if !log.exists() {
        anyhow::bail!("log '{}' does not exist", path.display());
    }

    let lock = LogLock::try_acquire(&log.lock_path())
        .with_context(|| format!("log '{}' is in use by a running node", path.display()))?;

    let state = ReplayedState::default();
    let report = recovery::load(&state, &log, policy)
        .with_context(|| format!("failed to replay '{}'", path.display()))?;
    Ok((lock, log, state, report))
}
