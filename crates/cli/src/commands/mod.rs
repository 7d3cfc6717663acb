use clap::Subcommand;
use std::path::PathBuf;

pub mod compact;
pub mod inspect;
pub mod replay;
pub mod run;

#[derive(Subcommand)]
pub enum Commands {
    /// Summarise a log without changing it
    Inspect {
        /// Path to the log file
        log: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a log and print the resulting cache state as JSON lines
    Replay {
        /// Path to the log file
        log: PathBuf,

        /// Skip corrupt records instead of failing
        #[arg(long)]
        skip_corrupt: bool,
    },

    /// Rewrite a log as one record per live key
    Compact {
        /// Path to the log file
        log: PathBuf,

        /// Skip corrupt records instead of failing
        #[arg(long)]
        skip_corrupt: bool,
    },

    /// Run a cache node that reads commands from stdin
    ///
    /// Commands, one per line: `put <key> <value> [ttl-secs]`,
    /// `add <key> <value> [ttl-secs]`, `get <key>`, `del <key>`, `flush`,
    /// `compact`, `stats`.
    Run {
        /// Directory holding the log (overrides config and environment)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Compact once the log grows past this many bytes
        #[arg(long)]
        max_size: Option<u64>,

        /// Flush interval in milliseconds
        #[arg(long)]
        flush_interval_ms: Option<u64>,

        /// Maximum number of cached keys
        #[arg(long, default_value = "100000")]
        capacity: usize,

        /// Skip corrupt records during boot replay
        #[arg(long)]
        skip_corrupt: bool,
    },
}
