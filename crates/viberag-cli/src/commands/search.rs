//! `viberag search`: run a query against the live index.

use anyhow::Result;
use clap::Args;

use super::{connect, print_result};
use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// The query text.
    query: String,

    /// Retrieval mode.
    #[arg(long, value_parser = ["semantic", "exact", "hybrid", "definition", "similar"], default_value = "hybrid")]
    mode: String,

    /// Maximum number of results.
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Restrict to files whose path starts with this prefix.
    #[arg(long)]
    path_prefix: Option<String>,

    /// Restrict to these file extensions (repeatable).
    #[arg(long = "extension")]
    extensions: Vec<String>,

    /// Include a per-hit explain blob describing the fusion.
    #[arg(long)]
    explain: bool,
}

pub async fn execute(args: SearchArgs, global: &GlobalOptions) -> Result<()> {
    let client = connect(global).await?;

    let options = serde_json::json!({
        "mode": args.mode,
        "limit": args.limit,
        "explain": args.explain,
        "filters": {
            "path_prefix": args.path_prefix,
            "extension": args.extensions,
        },
    });

    let result = client.search(&args.query, options).await?;
    print_result(global, &result, |v| {
        let blocks = v.get("blocks").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        if blocks.is_empty() {
            println!("no results");
            return;
        }
        for hit in blocks {
            let file_path = hit.get("file_path").and_then(|v| v.as_str()).unwrap_or("?");
            let start = hit.get("start_line").and_then(|v| v.as_u64()).unwrap_or(0);
            let end = hit.get("end_line").and_then(|v| v.as_u64()).unwrap_or(0);
            let title = hit.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let score = hit.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0);
            println!("{:.4}  {}:{}-{}  {}", score, file_path, start, end, title);
            if let Some(why) = hit.get("why").and_then(|v| v.as_str()) {
                println!("        {}", why);
            }
        }
    });
    Ok(())
}
