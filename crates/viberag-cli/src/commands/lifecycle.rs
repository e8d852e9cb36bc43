//! `viberag cancel` / `viberag shutdown`: lifecycle control RPCs.

use anyhow::Result;
use clap::Args;

use super::{connect, print_result};
use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// What to cancel.
    #[arg(long, value_parser = ["indexing", "warmup", "all"], default_value = "all")]
    target: String,

    /// Reason recorded alongside the cancellation.
    #[arg(long, default_value = "cli")]
    reason: String,
}

pub async fn execute_cancel(args: CancelArgs, global: &GlobalOptions) -> Result<()> {
    let client = connect(global).await?;
    let result = client.cancel(&args.target, &args.reason).await?;
    print_result(global, &result, |v| {
        let target = v.get("cancelled").and_then(|v| v.as_str()).unwrap_or(args.target.as_str());
        println!("cancelled: {}", target);
    });
    Ok(())
}

#[derive(Args, Debug)]
pub struct ShutdownArgs {
    /// Reason recorded in the daemon's shutdown log line.
    #[arg(long, default_value = "cli requested shutdown")]
    reason: String,
}

pub async fn execute_shutdown(args: ShutdownArgs, global: &GlobalOptions) -> Result<()> {
    let client = connect(global).await?;
    let result = client.shutdown(&args.reason).await?;
    print_result(global, &result, |_| {
        println!("shutdown requested");
    });
    Ok(())
}
