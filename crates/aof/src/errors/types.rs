//! Core error types for the persistence layer

use std::path::PathBuf;
use std::time::Duration;

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, AofError>;

/// Re-export AofError as Error for callers that prefer the short name
pub use AofError as Error;

/// Error type for append-only log operations
#[derive(Debug, thiserror::Error)]
pub enum AofError {
    /// I/O errors while touching the log or its temp file
    #[error("I/O error during {operation} on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
        recovery_hint: RecoveryHint,
    },

    /// A record in the log could not be parsed during replay
    #[error("corrupt record at {}:{line}: {reason}", .path.display())]
    CorruptRecord {
        path: PathBuf,
        line: usize,
        reason: String,
        recovery_hint: RecoveryHint,
    },

    /// The first line of the log is not a creation header
    #[error("log '{}' does not start with a creation header", .path.display())]
    MissingHeader {
        path: PathBuf,
        recovery_hint: RecoveryHint,
    },

    /// A record could not be encoded
    #[error("failed to encode record for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
        recovery_hint: RecoveryHint,
    },

    /// The rename that swaps a compacted log into place failed
    #[error(
        "failed to replace '{}' with '{}': {source}",
        .to.display(),
        .from.display()
    )]
    AtomicReplace {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
        recovery_hint: RecoveryHint,
    },

    /// Another persistence instance already owns this log
    #[error("log '{}' is already in use{}", .path.display(), format_owner(.pid))]
    AlreadyRunning {
        path: PathBuf,
        pid: Option<u32>,
        recovery_hint: RecoveryHint,
    },

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        recovery_hint: RecoveryHint,
    },

    /// The background flusher could not be driven
    #[error("background task error: {message}")]
    BackgroundTask {
        message: String,
        recovery_hint: RecoveryHint,
    },
}

fn format_owner(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!(" by process {pid}"),
        None => String::new(),
    }
}

/// Recovery hints for error handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryHint {
    /// Retry the operation
    Retry { after: Duration },

    /// Check file permissions
    CheckPermissions { path: PathBuf },

    /// Check disk space and clean up if needed
    CheckDiskSpace,

    /// Inspect (and possibly repair) the log by hand
    InspectLog { path: PathBuf, line: Option<usize> },

    /// Restart with the skip-corrupt replay policy
    UseSkipPolicy,

    /// Stop the other instance that owns the log
    StopOtherInstance { pid: Option<u32> },

    /// Update configuration
    UpdateConfiguration,

    /// No automated recovery possible
    Manual { instructions: String },
}
