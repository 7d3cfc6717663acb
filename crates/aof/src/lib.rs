//! Append-only persistence for the ghostcache in-memory cache
//!
//! Every cache mutation becomes one line in a log file. A background flusher
//! appends buffered records on a fixed interval and rewrites the log from a
//! snapshot once it grows past a size threshold. At boot the log is replayed
//! into the cache before the cache takes any writes.
//!
//! ```no_run
//! # async fn boot<C: ghostcache_aof::CacheBackend + 'static>(cache: std::sync::Arc<C>) -> ghostcache_aof::Result<()> {
//! use ghostcache_aof::{initialize_persistence, PersistenceConfigLoader};
//!
//! let config = PersistenceConfigLoader::load()?;
//! let handle = initialize_persistence(cache, config).await?;
//! // ... serve traffic ...
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod buffer;
pub mod compaction;
pub mod config;
pub mod entry;
pub mod errors;
pub mod flusher;
pub mod format;
pub mod handle;
pub mod log_file;
pub mod manager;
pub mod recovery;
pub mod stats;

#[cfg(test)]
mod testing;

pub use backend::{CacheBackend, RecordSink};
pub use buffer::WriteBuffer;
pub use compaction::CompactionReport;
pub use config::{PersistenceConfig, PersistenceConfigBuilder, PersistenceConfigLoader, ReplayPolicy};
pub use entry::{CacheEntry, LogEntry, Verb};
pub use errors::{AofError, RecoveryHint, Result};
pub use handle::{initialize_persistence, PersistenceHandle};
pub use log_file::LogFile;
pub use manager::{PersistenceManager, TickOutcome};
pub use recovery::RecoveryReport;
pub use stats::StatsSnapshot;
