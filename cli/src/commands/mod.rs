pub mod capture_session;
pub mod enqueue;
pub mod process_pending;
pub mod record_commit;
pub mod retry_dead_letter;
pub mod status;
pub mod worker;

use std::path::PathBuf;

use anyhow::Result;
use capture::CaptureService;
use clap::{Args, Parser, Subcommand};
use config::Config;

#[derive(Parser)]
#[command(
    name = "engram",
    author,
    version,
    about = "Engram - durable knowledge-capture queue",
    long_about = "Queues git-commit and conversation captures as durable jobs, \
                  processes them in the background, and stores sanitized \
                  summaries in the local knowledge store."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show queue occupancy, health, and worker state")]
    Status(status::StatusArgs),

    #[command(about = "Enqueue a raw job (advanced; prefer the capture commands)")]
    Enqueue(enqueue::EnqueueArgs),

    #[command(about = "Record a commit marker and queue a git capture")]
    RecordCommit(record_commit::RecordCommitArgs),

    #[command(about = "Queue a conversation capture for a session transcript")]
    CaptureSession(capture_session::CaptureSessionArgs),

    #[command(about = "Synchronously process everything claimable right now")]
    ProcessPending(process_pending::ProcessPendingArgs),

    #[command(subcommand, about = "Run or inspect the background worker")]
    Worker(worker::WorkerCommand),

    #[command(about = "Re-enqueue dead-lettered jobs")]
    RetryDeadLetter(retry_dead_letter::RetryDeadLetterArgs),
}

/// Options shared by every command that opens the service.
#[derive(Args)]
pub struct ServiceArgs {
    #[arg(long, help = "Config file (TOML or YAML); env vars override it")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Repository root to capture from", default_value = ".")]
    pub repo: PathBuf,
}

impl ServiceArgs {
    pub fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => config::load_from_file(path)?,
            None => config::load_from_env()
                .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?,
        };
        Ok(config)
    }

    pub fn open_service(&self) -> Result<CaptureService> {
        let mut config = self.load_config()?;
        // A CLI invocation exits as soon as its command returns, so a
        // background worker started here would be dropped before it
        // does any work. `worker run` starts one explicitly; everything
        // else drains synchronously via `process-pending`.
        config.worker.auto_start = false;
        CaptureService::new(config, &self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eg_core::types::{ExecutionMode, JobKind};

    #[tokio::test]
    async fn test_one_shot_service_never_auto_starts_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("engram.toml");
        std::fs::write(
            &config_path,
            format!(
                "data_dir = {:?}\n[worker]\nauto_start = true\n",
                dir.path().join("data")
            ),
        )
        .unwrap();

        let args = ServiceArgs {
            config: Some(config_path),
            repo: dir.path().to_path_buf(),
        };
        let service = args.open_service().unwrap();
        service
            .enqueue(
                JobKind::CaptureConversation,
                serde_json::json!({
                    "scope": "repo",
                    "sessionId": "sess-1",
                    "transcriptPath": dir.path().join("missing.jsonl"),
                    "mode": "incremental"
                }),
                ExecutionMode::Parallel,
            )
            .await
            .unwrap();

        // The empty-to-non-empty transition must not spawn a worker
        // that the process exit would abandon.
        assert!(!service.get_status().await.worker_running);
    }
}
