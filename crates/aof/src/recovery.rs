//! Boot-time replay of the log into the cache
//!
//! Records are applied strictly in file order, so the last record for a key
//! decides its final value. Unparseable records are handled according to
//! [`ReplayPolicy`]; an unterminated final line is always treated as the
//! remains of an interrupted append, dropped, and cut from the file.

use crate::backend::CacheBackend;
use crate::config::ReplayPolicy;
use crate::errors::{AofError, RecoveryHint, Result};
use crate::format;
use crate::log_file::LogFile;
use std::io::BufRead;

/// Outcome of a recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// No log existed and a fresh one was created
    pub created: bool,
    /// Records applied to the cache
    pub applied: usize,
    /// Corrupt records skipped under [`ReplayPolicy::Skip`]
    pub skipped: usize,
    /// An interrupted trailing record was dropped
    pub torn_tail: bool,
    /// Log size once recovery finished
    pub log_size: u64,
}

/// Populate `cache` from `log`, creating the log if it does not exist
#[tracing::instrument(level = "debug", skip(cache, log), fields(path = %log.path().display()))]
pub fn load<C>(cache: &C, log: &LogFile, policy: ReplayPolicy) -> Result<RecoveryReport>
where
    C: CacheBackend + ?Sized,
{
    let mut report = RecoveryReport::default();

    if !log.exists() {
        log.create()?;
        report.created = true;
        report.log_size = log.size()?;
        tracing::info!("Created new log at {}", log.path().display());
        return Ok(report);
    }

    let mut reader = log.reader()?;
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    let mut offset = 0u64;
    // End of the last line that is safe to keep
    let mut valid_end = 0u64;
    let mut needs_newline = false;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| AofError::io(log.path(), "read log during replay", e))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let line_start = offset;
        offset += read as u64;
        let complete = buf.last() == Some(&b'\n');

        let decoded = match std::str::from_utf8(&buf) {
            Err(e) => Err(format!("record is not valid UTF-8: {e}")),
            Ok(line) if line_no == 1 && format::is_header(line) => Ok(None),
            Ok(line)
                if line_no == 1
                    && (complete || line.trim().is_empty())
                    && policy == ReplayPolicy::Abort =>
            {
                return Err(AofError::MissingHeader {
                    path: log.path().to_path_buf(),
                    recovery_hint: RecoveryHint::UseSkipPolicy,
                });
            }
            Ok(line) => {
                if line_no == 1 && complete {
                    tracing::warn!(
                        "Log {} has no creation header, reading first line as data",
                        log.path().display()
                    );
                }
                if line.trim().is_empty() {
                    Ok(None)
                } else {
                    format::decode_entry(line).map(Some)
                }
            }
        };

        match decoded {
            Ok(None) => {}
            Ok(Some(entry)) => {
                cache.apply(entry.verb, &entry.key, &entry.value, entry.ttl);
                report.applied += 1;
            }
            Err(reason) if !complete => {
                tracing::warn!(
                    "Dropping interrupted record at {}:{}: {}",
                    log.path().display(),
                    line_no,
                    reason
                );
                report.torn_tail = true;
                valid_end = line_start;
                break;
            }
            Err(reason) => match policy {
                ReplayPolicy::Abort => return Err(AofError::corrupt(log.path(), line_no, reason)),
                ReplayPolicy::Skip => {
                    tracing::warn!(
                        "Skipping corrupt record at {}:{}: {}",
                        log.path().display(),
                        line_no,
                        reason
                    );
                    report.skipped += 1;
                }
            },
        }

        valid_end = offset;
        needs_newline = !complete;
    }
    drop(reader);

    if line_no == 0 {
        // Zero-length file: creation never got its header onto disk
        tracing::warn!(
            "Log {} is empty, writing a fresh header",
            log.path().display()
        );
        log.create()?;
    } else if report.torn_tail && valid_end == 0 {
        // Even the header was interrupted
        log.create()?;
    } else if report.torn_tail {
        log.truncate_to(valid_end)?;
    } else if needs_newline {
        log.append(b"\n", true)?;
    }

    report.log_size = log.size()?;
    tracing::info!(
        "Replayed {} records from {} ({} skipped{})",
        report.applied,
        log.path().display(),
        report.skipped,
        if report.torn_tail {
            ", interrupted tail dropped"
        } else {
            ""
        }
    );
    Ok(report)
}
