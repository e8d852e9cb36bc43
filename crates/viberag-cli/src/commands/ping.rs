//! `viberag ping`: liveness check, auto-spawning the daemon if needed.

use anyhow::Result;

use super::{connect, print_result};
use crate::GlobalOptions;

pub async fn execute(global: &GlobalOptions) -> Result<()> {
    let client = connect(global).await?;
    let result = client.ping().await?;
    print_result(global, &result, |v| {
        println!("pong (daemon version {})", v.get("version").and_then(|v| v.as_str()).unwrap_or("unknown"));
    });
    Ok(())
}
