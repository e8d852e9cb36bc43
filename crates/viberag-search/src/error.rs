//! Error types for viberag-search

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("store error: {0}")]
    Store(String),

    #[error("store I/O error: {0}")]
    StoreIo(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("provider rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("provider context-length exceeded for this input")]
    ContextLengthExceeded,

    #[error("indexing cancelled: {0}")]
    Cancelled(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("core error: {0}")]
    Core(#[from] viberag_core::CoreError),
}

pub type Result<T> = std::result::Result<T, SearchError>;
