use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use eg_core::types::TriggerMode;

use crate::say;

use super::ServiceArgs;
use super::record_commit::resolve_scope;

#[derive(Args)]
pub struct CaptureSessionArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[arg(help = "Session identifier")]
    pub session_id: String,

    #[arg(long, help = "Path to the JSONL session transcript")]
    pub transcript: PathBuf,

    #[arg(long, help = "Capture the whole session, not just new turns")]
    pub full: bool,

    #[arg(long, help = "Capture scope (defaults to the repo directory name)")]
    pub scope: Option<String>,
}

pub async fn run(args: CaptureSessionArgs) -> Result<()> {
    let scope = resolve_scope(&args.scope, &args.service.repo)?;
    let mode = if args.full {
        TriggerMode::Full
    } else {
        TriggerMode::Incremental
    };

    let service = args.service.open_service()?;
    let id = service
        .capture_session(&scope, &args.session_id, &args.transcript, mode)
        .await?;
    say!("Queued conversation capture {id} ({mode})");
    Ok(())
}
