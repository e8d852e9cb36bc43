//! JSON-RPC error codes (spec §4.12) and the transport-level error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard JSON-RPC 2.0 codes plus VibeRAG's application-specific range.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub const NOT_INITIALIZED: i64 = -32001;
    pub const INDEX_IN_PROGRESS: i64 = -32002;
    pub const SHUTDOWN_IN_PROGRESS: i64 = -32003;
    pub const CONNECTION_ERROR: i64 = -32004;
}

/// A JSON-RPC 2.0 error object, as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    pub fn not_initialized(message: impl Into<String>) -> Self {
        Self::new(codes::NOT_INITIALIZED, message)
    }

    pub fn index_in_progress(message: impl Into<String>) -> Self {
        Self::new(codes::INDEX_IN_PROGRESS, message)
    }

    pub fn shutdown_in_progress(message: impl Into<String>) -> Self {
        Self::new(codes::SHUTDOWN_IN_PROGRESS, message)
    }

    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::new(codes::CONNECTION_ERROR, message)
    }
}

/// Transport/framing-level failures, distinct from application errors that
/// travel inside a well-formed [`crate::protocol::Response`].
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON-RPC request: {0}")]
    Parse(String),

    #[error("line exceeded maximum size of {0} bytes")]
    LineTooLong(usize),
}

pub type Result<T> = std::result::Result<T, RpcError>;
