//! `viberag`: a thin command-line shell over the daemon's JSON-RPC
//! interface (spec §4.14, out-of-scope as a product surface, but its
//! calls into [`viberag_client`] exercise the same contract an editor
//! extension or MCP shim would use).

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// VibeRAG: local semantic code search for AI coding agents.
#[derive(Parser, Debug)]
#[command(name = "viberag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Project root to operate on (defaults to the current directory).
    #[arg(long, short = 'C', global = true, env = "VIBERAG_PROJECT_ROOT")]
    pub root: Option<PathBuf>,

    /// Emit raw JSON instead of a formatted summary.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

impl GlobalOptions {
    pub fn project_root(&self) -> Result<PathBuf> {
        Ok(self.root.clone().unwrap_or(std::env::current_dir()?))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default project config so the daemon can start.
    Init(commands::init::InitArgs),

    /// Check whether the daemon is reachable and report its version.
    Ping,

    /// Run (or trigger) an indexing pass.
    Index(commands::index::IndexArgs),

    /// Search the index.
    Search(commands::search::SearchArgs),

    /// Show daemon / indexing / watcher status.
    Status,

    /// Fetch a symbol by id.
    GetSymbol(commands::symbol::GetSymbolArgs),

    /// Find usages of a token.
    FindUsages(commands::symbol::FindUsagesArgs),

    /// Cancel an in-flight operation.
    Cancel(commands::lifecycle::CancelArgs),

    /// Gracefully shut the daemon down.
    Shutdown(commands::lifecycle::ShutdownArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.global.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).with_writer(std::io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &cli.global).await,
        Commands::Ping => commands::ping::execute(&cli.global).await,
        Commands::Index(args) => commands::index::execute(args, &cli.global).await,
        Commands::Search(args) => commands::search::execute(args, &cli.global).await,
        Commands::Status => commands::status::execute(&cli.global).await,
        Commands::GetSymbol(args) => commands::symbol::execute_get_symbol(args, &cli.global).await,
        Commands::FindUsages(args) => commands::symbol::execute_find_usages(args, &cli.global).await,
        Commands::Cancel(args) => commands::lifecycle::execute_cancel(args, &cli.global).await,
        Commands::Shutdown(args) => commands::lifecycle::execute_shutdown(args, &cli.global).await,
    }
}
