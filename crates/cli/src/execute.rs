use crate::commands::Commands;
use anyhow::Result;

impl Commands {
    pub async fn execute(self) -> Result<()> {
        match self {
            Commands::Inspect { log, json } => crate::commands::inspect::execute(&log, json),
            Commands::Replay { log, skip_corrupt } => {
                crate::commands::replay::execute(&log, skip_corrupt)
            }
            Commands::Compact { log, skip_corrupt } => {
                crate::commands::compact::execute(&log, skip_corrupt)
            }
            Commands::Run {
                dir,
                max_size,
                flush_interval_ms,
                capacity,
                skip_corrupt,
            } => {
                let options = crate::commands::run::RunOptions {
                    dir,
                    max_size,
                    flush_interval_ms,
                    capacity,
                    skip_corrupt,
                };
                crate::commands::run::execute(options).await
            }
        }
    }
}
