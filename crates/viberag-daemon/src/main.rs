//! `viberag-daemon`: the per-project background process (spec §4.13).
//!
//! Started directly for debugging, or auto-spawned detached by
//! `viberag-client` when a project's socket isn't reachable.

mod error;
mod idle;
mod lock;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use viberag_core::config::ProjectConfig;
use viberag_core::paths::{PathResolver, SocketAddr};
use viberag_search::{Indexer, SearchEngine, Store};
use viberag_watch::FileWatcher;

use crate::error::DaemonError;
use crate::lock::SingleInstanceLock;
use crate::state::DaemonState;

const DEFAULT_IDLE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// VibeRAG project daemon: owns the index, the watcher, and the RPC socket
/// for one project.
#[derive(Parser, Debug)]
#[command(name = "viberag-daemon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root to serve (defaults to the current directory).
    #[arg(long, env = "VIBERAG_PROJECT_ROOT")]
    root: Option<PathBuf>,

    /// Override the VibeRAG home directory (data + runtime files).
    #[arg(long, env = "VIBERAG_HOME")]
    home: Option<PathBuf>,

    /// Idle shutdown window in milliseconds.
    #[arg(long, env = "VIBERAG_IDLE_TIMEOUT_MS", default_value_t = DEFAULT_IDLE_TIMEOUT_MS)]
    idle_timeout_ms: u64,

    /// Increase log verbosity.
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(cli))
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let project_root = cli.root.unwrap_or(std::env::current_dir()?);
    let paths = PathResolver::new(&project_root, cli.home)?;

    let config_path = paths.config_path();
    let config = ProjectConfig::load(&config_path)?.ok_or_else(|| {
        DaemonError::NotInitialized(format!("no config at {}, run `viberag init` first", config_path.display()))
    })?;
    config.validate()?;

    info!(project_id = paths.project_id(), root = %paths.project_root().display(), "starting viberag-daemon");

    let lock = SingleInstanceLock::acquire(&paths.lock_path())?;
    let result = run_with_lock(paths, config, cli.idle_timeout_ms).await;
    lock.release().await;
    result
}

async fn run_with_lock(paths: PathResolver, config: ProjectConfig, idle_timeout_ms: u64) -> anyhow::Result<()> {
    std::fs::create_dir_all(paths.run_dir())?;
    std::fs::write(paths.pid_path(), std::process::id().to_string())?;

    let store = Arc::new(Store::connect(&paths.lancedb_path(), config.effective_dimensions()).await?);
    let indexer = Arc::new(Indexer::new(paths.clone(), config.clone(), store.clone())?);
    let provider = viberag_search::embeddings::build_provider(&config)?;
    let search_engine = Arc::new(SearchEngine::new(store.clone(), provider.clone()));
    let watcher = Arc::new(FileWatcher::new(paths.project_root().to_path_buf(), config.watch.clone()));

    let state = Arc::new(DaemonState::new(paths.clone(), config.clone(), store, provider.clone(), search_engine, indexer, watcher.clone()));
    DaemonState::install_self_ref(&state);

    // Warm the provider in the background; search/index requests will
    // also call `ensure_warm`, so a slow model load doesn't block startup.
    tokio::spawn({
        let provider = provider.clone();
        async move {
            if let Err(e) = provider.initialize(None).await {
                warn!(error = %e, "embedding provider warmup failed, will retry lazily on first request");
            }
        }
    });

    if config.watch.enabled {
        if let Err(e) = watcher.start(state.clone()) {
            warn!(error = %e, "failed to start file watcher, continuing without live reindexing");
        }
    }

    let rpc_shutdown = CancellationToken::new();
    let socket_path = match paths.socket_path() {
        SocketAddr::Unix(p) => p,
        SocketAddr::NamedPipe(name) => {
            return Err(anyhow::anyhow!("named pipe transport '{}' is not implemented on this platform", name));
        }
    };

    let serve_handle = {
        let socket_path = socket_path.clone();
        let handler: Arc<dyn viberag_rpc::RpcHandler> = state.clone();
        let shutdown = rpc_shutdown.clone();
        tokio::spawn(async move { viberag_rpc::serve_unix(&socket_path, handler, shutdown).await })
    };

    let idle_shutdown = CancellationToken::new();
    let idle_handle = tokio::spawn(idle::run(state.clone(), Duration::from_millis(idle_timeout_ms), idle_shutdown.clone()));

    tokio::select! {
        _ = shutdown_signal() => info!("shutdown signal received"),
        _ = state.shutdown_requested.cancelled() => info!("shutdown requested via RPC"),
    }

    info!("shutting down");
    idle_shutdown.cancel();
    let _ = idle_handle.await;

    rpc_shutdown.cancel();
    let _ = serve_handle.await;

    state.shutdown().await;

    let _ = std::fs::remove_file(&socket_path);
    let _ = std::fs::remove_file(paths.pid_path());

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
