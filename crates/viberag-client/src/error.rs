//! Client-side error type (spec §4.14).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("project is not initialized: no config at {0}")]
    NotInitialized(String),

    #[error("timed out waiting {0:?} for the daemon socket to accept connections")]
    SpawnTimeout(std::time::Duration),

    #[error("timed out waiting {0:?} for a response to '{1}'")]
    RequestTimeout(std::time::Duration, String),

    #[error("daemon returned an error ({code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response from daemon: {0}")]
    MalformedResponse(String),

    #[error("failed to spawn daemon process: {0}")]
    SpawnFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] viberag_core::error::CoreError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
