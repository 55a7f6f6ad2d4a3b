use anyhow::Result;
use clap::{Args, Subcommand};

use crate::say;

use super::ServiceArgs;

#[derive(Subcommand)]
pub enum WorkerCommand {
    #[command(about = "Run the background worker until interrupted")]
    Run(WorkerRunArgs),
}

#[derive(Args)]
pub struct WorkerRunArgs {
    #[command(flatten)]
    pub service: ServiceArgs,
}

pub async fn run(cmd: WorkerCommand) -> Result<()> {
    match cmd {
        WorkerCommand::Run(args) => run_worker(args).await,
    }
}

async fn run_worker(args: WorkerRunArgs) -> Result<()> {
    let service = args.service.open_service()?;
    service.start_worker().await;
    say!("Worker running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    say!("Stopping worker...");
    service.stop_worker().await?;
    Ok(())
}
