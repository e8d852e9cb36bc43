//! Per-subcommand implementations, one module each, mirroring the
//! daemon's JSON-RPC method set (spec §4.12).

pub mod index;
pub mod init;
pub mod lifecycle;
pub mod ping;
pub mod search;
pub mod status;
pub mod symbol;

use anyhow::Result;
use viberag_client::{ClientSource, DaemonClient};

use crate::GlobalOptions;

/// Connect to (auto-spawning if necessary) the daemon for `global`'s
/// project root, tagged as a CLI-sourced client.
pub async fn connect(global: &GlobalOptions) -> Result<DaemonClient> {
    let root = global.project_root()?;
    let client = DaemonClient::connect(&root, ClientSource::Cli).await?;
    Ok(client)
}

/// Print `value` as pretty JSON if `--json` was passed, else hand it to
/// `render` for a human-friendly summary.
pub fn print_result(global: &GlobalOptions, value: &serde_json::Value, render: impl FnOnce(&serde_json::Value)) {
    if global.json {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()));
    } else {
        render(value);
    }
}
