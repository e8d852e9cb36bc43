//! Error types for viberag-core

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in viberag-core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("project root does not exist: {0}")]
    ProjectRootNotFound(PathBuf),

    #[error("failed to hash {path}: {reason}")]
    HashError { path: PathBuf, reason: String },

    #[error("manifest schema version {found} is older than required {required}; reindex required")]
    SchemaVersionMismatch { found: u32, required: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for viberag-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
