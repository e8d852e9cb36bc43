//! `viberag init`: write a default project config so the daemon has
//! something to load. The interactive wizard (provider selection,
//! `.gitignore` editing) is out of scope for the daemon core; this writes
//! sane defaults a user can hand-edit afterward.

use anyhow::{Context, Result};
use clap::Args;
use viberag_core::config::ProjectConfig;
use viberag_core::paths::PathResolver;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config instead of leaving it untouched.
    #[arg(long)]
    force: bool,
}

pub async fn execute(args: InitArgs, global: &GlobalOptions) -> Result<()> {
    let root = global.project_root()?;
    let paths = PathResolver::new(&root, None).context("resolving project paths")?;
    let config_path = paths.config_path();

    if config_path.exists() && !args.force {
        println!("config already exists at {}, pass --force to overwrite", config_path.display());
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let config = ProjectConfig::default();
    config.save(&config_path).context("writing default config")?;

    println!("wrote {}", config_path.display());
    println!("project id: {}", paths.project_id());
    Ok(())
}
