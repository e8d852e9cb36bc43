//! Error type for the file watcher (spec §4.11).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to start watching {path}: {source}")]
    Start { path: String, #[source] source: notify::Error },

    #[error("watcher already running")]
    AlreadyRunning,

    #[error("watcher is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, WatchError>;
