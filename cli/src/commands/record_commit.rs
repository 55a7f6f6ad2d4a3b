use anyhow::Result;
use clap::Args;
use eg_core::types::ScopeRef;

use crate::say;

use super::ServiceArgs;

#[derive(Args)]
pub struct RecordCommitArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[arg(help = "Commit id to capture")]
    pub commit: String,

    #[arg(long, help = "Capture scope (defaults to the repo directory name)")]
    pub scope: Option<String>,
}

pub(super) fn resolve_scope(
    scope: &Option<String>,
    repo: &std::path::Path,
) -> Result<ScopeRef> {
    let raw = match scope {
        Some(s) => s.clone(),
        None => repo
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "default".to_string()),
    };
    ScopeRef::new(&raw).ok_or_else(|| anyhow::anyhow!("invalid scope: {raw:?}"))
}

pub async fn run(args: RecordCommitArgs) -> Result<()> {
    let scope = resolve_scope(&args.scope, &args.service.repo)?;
    let service = args.service.open_service()?;
    let id = service.record_commit(&scope, &args.commit).await?;
    say!("Queued git capture {id} for commit {}", args.commit);
    Ok(())
}
