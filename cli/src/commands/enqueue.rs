use anyhow::Result;
use clap::Args;
use eg_core::types::{ExecutionMode, JobKind};

use crate::say;

use super::ServiceArgs;

#[derive(Args)]
pub struct EnqueueArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[arg(long, help = "Job kind (capture_git_commits | capture_conversation)")]
    pub kind: JobKind,

    #[arg(long, help = "JSON payload for the job")]
    pub payload: String,

    #[arg(long, help = "Enqueue as a sequential barrier job")]
    pub sequential: bool,
}

pub async fn run(args: EnqueueArgs) -> Result<()> {
    let payload: serde_json::Value = serde_json::from_str(&args.payload)?;
    let mode = if args.sequential {
        ExecutionMode::Sequential
    } else {
        ExecutionMode::Parallel
    };

    let service = args.service.open_service()?;
    let id = service.enqueue(args.kind, payload, mode).await?;
    say!("Enqueued job {id}");
    Ok(())
}
