//! `viberag status`: daemon health, indexing, and watcher snapshot.

use anyhow::Result;

use super::{connect, print_result};
use crate::GlobalOptions;

pub async fn execute(global: &GlobalOptions) -> Result<()> {
    let client = connect(global).await?;
    let result = client.status().await?;
    print_result(global, &result, |v| {
        let project_id = v.get("projectId").and_then(|v| v.as_str()).unwrap_or("?");
        println!("project: {}", project_id);

        if let Some(health) = v.get("health") {
            let uptime = health.get("uptimeSeconds").and_then(|v| v.as_u64()).unwrap_or(0);
            let indexing = health.get("indexingInProgress").and_then(|v| v.as_bool()).unwrap_or(false);
            println!("uptime: {}s, indexing in progress: {}", uptime, indexing);
        }

        if let Some(provider) = v.get("provider").and_then(|v| v.as_str()) {
            println!("embedding provider: {}", provider);
        }

        if let Some(watch) = v.get("watchStatus") {
            let state = watch.get("state").and_then(|v| v.as_str()).unwrap_or("?");
            let pending = watch.get("pending_paths").and_then(|v| v.as_u64()).unwrap_or(0);
            println!("watcher: {} ({} pending)", state, pending);
        }

        if let Some(runs) = v.get("indexRuns").and_then(|v| v.as_array()) {
            for run in runs {
                let id = run.get("id").and_then(|v| v.as_str()).unwrap_or("?");
                let state = run.get("state").and_then(|v| v.as_str()).unwrap_or("?");
                println!("run {}: {}", id, state);
            }
        }
    });
    Ok(())
}
