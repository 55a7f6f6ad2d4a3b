use anyhow::Result;
use clap::Args;
use colored::Colorize;
use eg_core::types::HealthLevel;

use crate::say;

use super::ServiceArgs;

#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let service = args.service.open_service()?;
    let status = service.get_status().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    say!("{}", "Engram Status".bold().underline());
    say!();
    let health = match status.health {
        HealthLevel::Ok => "ok".green(),
        HealthLevel::Warning => "warning".yellow(),
        HealthLevel::Error => "error".red(),
    };
    say!("  health:       {health}");
    say!("  pending:      {}", status.queue.pending_count);
    say!("  dead letters: {}", status.queue.dead_letter_count);
    say!("  capacity:     {:.1}%", status.queue.capacity_pct);
    say!(
        "  worker:       {}",
        if status.worker_running { "running".green() } else { "stopped".dimmed() }
    );
    Ok(())
}
