//! Classification helpers and constructors for persistence errors

use super::types::{AofError, RecoveryHint};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

impl AofError {
    /// Build an I/O error, choosing a recovery hint from the error kind
    pub fn io(path: &Path, operation: &'static str, source: std::io::Error) -> Self {
        let recovery_hint = match source.kind() {
            ErrorKind::PermissionDenied | ErrorKind::NotFound => RecoveryHint::CheckPermissions {
                path: path.to_path_buf(),
            },
            ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
                RecoveryHint::Retry {
                    after: Duration::from_millis(100),
                }
            }
            ErrorKind::WriteZero | ErrorKind::UnexpectedEof => RecoveryHint::CheckDiskSpace,
            _ if is_out_of_space(&source) => RecoveryHint::CheckDiskSpace,
            _ => RecoveryHint::Retry {
                after: Duration::from_secs(1),
            },
        };

        Self::Io {
            path: path.to_path_buf(),
            operation,
            source,
            recovery_hint,
        }
    }

    /// Build a corrupt-record error for a given 1-based line
    pub fn corrupt(path: &Path, line: usize, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            path: path.to_path_buf(),
            line,
            reason: reason.into(),
            recovery_hint: RecoveryHint::InspectLog {
                path: path.to_path_buf(),
                line: Some(line),
            },
        }
    }

    /// Build a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            recovery_hint: RecoveryHint::UpdateConfiguration,
        }
    }

    /// Get the recovery hint for this error
    #[must_use]
    pub const fn recovery_hint(&self) -> &RecoveryHint {
        match self {
            Self::Io { recovery_hint, .. }
            | Self::CorruptRecord { recovery_hint, .. }
            | Self::MissingHeader { recovery_hint, .. }
            | Self::Serialization { recovery_hint, .. }
            | Self::AtomicReplace { recovery_hint, .. }
            | Self::AlreadyRunning { recovery_hint, .. }
            | Self::Configuration { recovery_hint, .. }
            | Self::BackgroundTask { recovery_hint, .. } => recovery_hint,
        }
    }

    /// Check if this error is transient and the operation can be retried
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.recovery_hint(), RecoveryHint::Retry { .. })
    }

    /// Check if this error indicates a damaged log
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptRecord { .. } | Self::MissingHeader { .. }
        )
    }
}

#[cfg(unix)]
fn is_out_of_space(error: &std::io::Error) -> bool {
    error.raw_os_error() == Some(libc::ENOSPC)
}

#[cfg(not(unix))]
fn is_out_of_space(_error: &std::io::Error) -> bool {
    false
}
