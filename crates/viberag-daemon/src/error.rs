//! Error type for the daemon owner/lifecycle (spec §4.13).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("project is not initialized: run `viberag init` first ({0})")]
    NotInitialized(String),

    #[error("another daemon is already running for this project")]
    AlreadyRunning,

    #[error("lost the single-instance lock mid-run")]
    LockCompromised,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] viberag_core::error::CoreError),

    #[error(transparent)]
    Search(#[from] viberag_search::error::SearchError),

    #[error(transparent)]
    Watch(#[from] viberag_watch::error::WatchError),

    #[error(transparent)]
    Rpc(#[from] viberag_rpc::RpcError),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
