use clap::Parser;

mod commands;
mod execute;
mod state;

use commands::Commands;

#[derive(Parser)]
#[command(name = "ghostcache")]
#[command(about = "Inspect, replay and compact ghostcache persistence logs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ghostcache_utils::tracing::init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing: {e}"))?;

    let cli = Cli::parse();
    cli.command.execute().await
}
