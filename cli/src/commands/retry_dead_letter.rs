use anyhow::Result;
use clap::Args;
use colored::Colorize;
use queue::RetrySelector;

use crate::say;

use super::ServiceArgs;

#[derive(Args)]
pub struct RetryDeadLetterArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[arg(long, help = "Retry a single dead-lettered job by id")]
    pub id: Option<String>,

    #[arg(long, help = "List dead letters instead of retrying")]
    pub list: bool,
}

pub async fn run(args: RetryDeadLetterArgs) -> Result<()> {
    let service = args.service.open_service()?;

    if args.list {
        let dead = service.dead_letters().await;
        if dead.is_empty() {
            say!("No dead-lettered jobs");
            return Ok(());
        }
        for entry in dead {
            say!(
                "{}  {}  attempts={}  {}",
                entry.job.id.dimmed(),
                entry.job.kind,
                entry.job.attempts,
                entry.final_error.red()
            );
        }
        return Ok(());
    }

    let selector = match args.id {
        Some(id) => RetrySelector::Id(id),
        None => RetrySelector::All,
    };
    let ids = service.retry_dead_letter(selector).await?;
    say!("Re-enqueued {} job(s)", ids.len());
    for id in ids {
        say!("  {id}");
    }
    Ok(())
}
