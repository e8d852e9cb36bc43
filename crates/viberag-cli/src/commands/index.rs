//! `viberag index`: trigger an indexing pass, synchronously by default.

use anyhow::Result;
use clap::Args;

use super::{connect, print_result};
use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Drop and recreate entity tables before indexing.
    #[arg(long)]
    force: bool,

    /// With --force, also drop the embedding cache.
    #[arg(long)]
    drop_cache: bool,

    /// Kick off indexing and return immediately instead of waiting.
    #[arg(long)]
    r#async: bool,
}

pub async fn execute(args: IndexArgs, global: &GlobalOptions) -> Result<()> {
    let client = connect(global).await?;

    if args.r#async {
        let id = client.index_async(args.force, args.drop_cache).await?;
        print_result(global, &serde_json::json!({ "id": id }), |_| {
            println!("indexing started, run id {}", id);
        });
        return Ok(());
    }

    let result = client.index(args.force, args.drop_cache).await?;
    print_result(global, &result, |v| {
        let scanned = v.get("files_scanned").and_then(|v| v.as_u64()).unwrap_or(0);
        let new = v.get("files_new").and_then(|v| v.as_u64()).unwrap_or(0);
        let modified = v.get("files_modified").and_then(|v| v.as_u64()).unwrap_or(0);
        let deleted = v.get("files_deleted").and_then(|v| v.as_u64()).unwrap_or(0);
        println!(
            "indexed: {} scanned, {} new, {} modified, {} deleted",
            scanned, new, modified, deleted
        );
    });
    Ok(())
}
