//! Shared utilities for ghostcache
//!
//! Path resolution, tracing setup and the per-log process lock used by the
//! persistence layer and the command line.

pub mod log_lock;
pub mod tracing;
pub mod xdg;

pub use log_lock::{LockError, LogLock};
pub use xdg::XdgPaths;
