//! Exclusive per-log lock so only one process (or one boot within a
//! process) ever appends to a given log
//!
//! The lock is an advisory `flock` on `<log>.lock`. The file is never
//! removed, so every contender locks the same inode. The kernel releases the
//! flock when its holder exits.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock '{}' is held{}", path.display(), owner(*pid))]
    Held { path: PathBuf, pid: Option<u32> },

    #[error("failed to lock '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn owner(pid: Option<u32>) -> String {
    pid.map(|pid| format!(" by process {pid}"))
        .unwrap_or_default()
}

/// Held lock on a `<log>.lock` file, released on drop
#[derive(Debug)]
pub struct LogLock {
    lock_file: File,
    lock_path: PathBuf,
    pid: u32,
}

impl LogLock {
    /// Try to take the lock at `lock_path` without blocking
    pub fn try_acquire(lock_path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: lock_path.to_path_buf(),
            source,
        };

        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let mut lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(io_err)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                return Err(LockError::Held {
                    path: lock_path.to_path_buf(),
                    pid: read_pid(lock_path),
                });
            }
            Err(e) => return Err(io_err(e)),
        }

        let pid = std::process::id();
        lock_file.set_len(0).map_err(io_err)?;
        writeln!(lock_file, "{pid}").map_err(io_err)?;
        lock_file.sync_all().map_err(io_err)?;
        ::tracing::debug!("Acquired {} for process {}", lock_path.display(), pid);

        Ok(Self {
            lock_file,
            lock_path: lock_path.to_path_buf(),
            pid,
        })
    }

    /// Get the PID that owns this lock
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for LogLock {
    fn drop(&mut self) {
        // Never unlink: a contender may already hold an open handle
        let _ = self.lock_file.unlock();
    }
}

fn read_pid(lock_path: &Path) -> Option<u32> {
    fs::read_to_string(lock_path).ok()?.trim().parse().ok()
}
