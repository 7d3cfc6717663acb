//! Single on-disk log file
//!
//! Every operation opens the file, does its work and closes it again; no
//! handle outlives a call. Appends that fail part-way are rolled back so the
//! file never keeps a torn record.

use crate::errors::{AofError, RecoveryHint, Result};
use crate::format;
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

/// Handle to a log file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling `<log>.lock` guarding this log against a second writer
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Sibling `temp_<log>` used as the compaction staging file
    pub fn temp_sibling(&self) -> LogFile {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        LogFile::new(self.path.with_file_name(format!("temp_{name}")))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create (or truncate) the file and write the creation header
    pub fn create(&self) -> Result<()> {
        self.write_fresh(&[])
    }

    /// Create (or truncate) the file with a header followed by `body`.
    ///
    /// All bytes are synced before this returns.
    pub fn write_fresh(&self, body: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| AofError::io(parent, "create log directory", e))?;
            }
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| AofError::io(&self.path, "create log file", e))?;

        let mut header = format::header_line(&Utc::now());
        header.push('\n');

        file.write_all(header.as_bytes())
            .map_err(|e| AofError::io(&self.path, "write log header", e))?;
        file.write_all(body)
            .map_err(|e| AofError::io(&self.path, "write log body", e))?;
        file.sync_all()
            .map_err(|e| AofError::io(&self.path, "sync log file", e))?;

        Ok(())
    }

    /// Append `bytes` and return the resulting file size.
    ///
    /// On failure the file is truncated back to its previous length.
    pub fn append(&self, bytes: &[u8], sync: bool) -> Result<u64> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| AofError::io(&self.path, "open log for append", e))?;

        let before = file
            .metadata()
            .map_err(|e| AofError::io(&self.path, "stat log before append", e))?
            .len();

        let written = file.write_all(bytes).and_then(|()| {
            if sync {
                file.sync_data()
            } else {
                Ok(())
            }
        });

        match written {
            Ok(()) => Ok(before + bytes.len() as u64),
            Err(e) => {
                if let Err(rollback) = file.set_len(before) {
                    tracing::warn!(
                        "Failed to roll back partial append on {}: {}",
                        self.path.display(),
                        rollback
                    );
                }
                Err(AofError::io(&self.path, "append to log", e))
            }
        }
    }

    /// Current size in bytes
    pub fn size(&self) -> Result<u64> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| AofError::io(&self.path, "stat log", e))
    }

    /// Cut the file down to `len` bytes
    pub fn truncate_to(&self, len: u64) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| AofError::io(&self.path, "open log for truncation", e))?;
        file.set_len(len)
            .and_then(|()| file.sync_all())
            .map_err(|e| AofError::io(&self.path, "truncate log", e))
    }

    /// Open a buffered reader over the file
    pub fn reader(&self) -> Result<BufReader<File>> {
        File::open(&self.path)
            .map(BufReader::new)
            .map_err(|e| AofError::io(&self.path, "open log for replay", e))
    }

    /// Remove the file, treating a missing file as success
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AofError::io(&self.path, "remove log file", e)),
        }
    }

    /// Atomically move this file over `target`.
    ///
    /// `rename` is atomic when both paths live on the same file system, which
    /// holds for the sibling temp file used by compaction. On failure `target`
    /// is untouched.
    pub fn atomic_replace(&self, target: &LogFile) -> Result<()> {
        fs::rename(&self.path, &target.path).map_err(|e| AofError::AtomicReplace {
            from: self.path.clone(),
            to: target.path.clone(),
            source: e,
            recovery_hint: RecoveryHint::CheckPermissions {
                path: target.path.clone(),
            },
        })?;

        sync_parent_dir(&target.path);
        Ok(())
    }
}

/// Persist the directory entry after a rename
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::warn!("Failed to sync directory {}: {}", parent.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
