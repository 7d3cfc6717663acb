use crate::state::{replay_locked, replay_policy};
use anyhow::Result;
use std::io::Write;
use std::path::Path;

pub fn execute(path: &Path, skip_corrupt: bool) -> Result<()> {
    let (_lock, _log, state, report) = replay_locked(path, replay_policy(skip_corrupt))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for entry in state.into_entries() {
        serde_json::to_writer(&mut out, &entry)?;
        writeln!(out)?;
    }
    out.flush()?;

    tracing::info!(
        "Replayed {} records from {} ({} skipped)",
        report.applied,
        path.display(),
        report.skipped
    );
    Ok(())
}
