use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status(args) => commands::status::run(args).await,
        Commands::Enqueue(args) => commands::enqueue::run(args).await,
        Commands::RecordCommit(args) => commands::record_commit::run(args).await,
        Commands::CaptureSession(args) => commands::capture_session::run(args).await,
        Commands::ProcessPending(args) => commands::process_pending::run(args).await,
        Commands::Worker(cmd) => commands::worker::run(cmd).await,
        Commands::RetryDeadLetter(args) => commands::retry_dead_letter::run(args).await,
    }
}
