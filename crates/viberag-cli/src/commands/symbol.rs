//! `viberag get-symbol` / `viberag find-usages`: metadata lookups.

use anyhow::Result;
use clap::Args;

use super::{connect, print_result};
use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct GetSymbolArgs {
    /// The `symbol_id` to fetch.
    symbol_id: String,
}

pub async fn execute_get_symbol(args: GetSymbolArgs, global: &GlobalOptions) -> Result<()> {
    let client = connect(global).await?;
    let result = client.get_symbol(&args.symbol_id).await?;
    print_result(global, &result, |v| {
        if v.is_null() {
            println!("no symbol found for {}", args.symbol_id);
            return;
        }
        let name = v.get("symbol_name").and_then(|v| v.as_str()).unwrap_or("?");
        let kind = v.get("symbol_kind").and_then(|v| v.as_str()).unwrap_or("?");
        let file_path = v.get("file_path").and_then(|v| v.as_str()).unwrap_or("?");
        let start = v.get("start_line").and_then(|v| v.as_u64()).unwrap_or(0);
        let end = v.get("end_line").and_then(|v| v.as_u64()).unwrap_or(0);
        println!("{} {} at {}:{}-{}", kind, name, file_path, start, end);
        if let Some(sig) = v.get("signature").and_then(|v| v.as_str()) {
            if !sig.is_empty() {
                println!("  {}", sig);
            }
        }
    });
    Ok(())
}

#[derive(Args, Debug)]
pub struct FindUsagesArgs {
    /// Token text to search for in `refs.token_text`.
    token: String,

    /// Maximum number of results.
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

pub async fn execute_find_usages(args: FindUsagesArgs, global: &GlobalOptions) -> Result<()> {
    let client = connect(global).await?;
    let result = client.find_usages(&args.token, args.limit).await?;
    print_result(global, &result, |v| {
        let hits = v.as_array().cloned().unwrap_or_default();
        if hits.is_empty() {
            println!("no usages found for '{}'", args.token);
            return;
        }
        for hit in hits {
            let file_path = hit.get("file_path").and_then(|v| v.as_str()).unwrap_or("?");
            let start = hit.get("start_line").and_then(|v| v.as_u64()).unwrap_or(0);
            let kind = hit.get("ref_kind").and_then(|v| v.as_str()).unwrap_or("?");
            println!("{}  {}:{}", kind, file_path, start);
        }
    });
    Ok(())
}
