use anyhow::Result;
use clap::Args;

use crate::say;

use super::ServiceArgs;

#[derive(Args)]
pub struct ProcessPendingArgs {
    #[command(flatten)]
    pub service: ServiceArgs,
}

pub async fn run(args: ProcessPendingArgs) -> Result<()> {
    let service = args.service.open_service()?;
    let processed = service.process_pending().await?;
    say!("Processed {processed} job(s)");
    Ok(())
}
