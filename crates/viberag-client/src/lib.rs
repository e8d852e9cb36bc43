//! viberag-client: given a project root, compute the daemon's socket path
//! identically to the daemon, auto-spawn it if unreachable, and expose
//! typed wrappers over its JSON-RPC methods (spec §4.14).
//!
//! Clients never write index files or touch the store directly; every
//! operation round-trips through the daemon's socket.

pub mod error;
mod spawn;
mod transport;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

pub use error::{ClientError, Result};
use transport::Transport;
use viberag_core::paths::PathResolver;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DAEMON_START_TIMEOUT: Duration = Duration::from_secs(30);

/// Which shell is driving this client, tagged on every request as
/// `params.__client` for the daemon to strip and use for rate-shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientSource {
    Cli,
    Mcp,
}

impl ClientSource {
    fn as_str(self) -> &'static str {
        match self {
            ClientSource::Cli => "cli",
            ClientSource::Mcp => "mcp",
        }
    }
}

/// A connection to one project's daemon, auto-spawning it if necessary.
pub struct DaemonClient {
    transport: Transport,
    source: ClientSource,
    timeout: Duration,
}

impl DaemonClient {
    /// Resolve `project_root`'s daemon socket, auto-spawning the daemon
    /// (detached) if no process is listening yet, then connect.
    pub async fn connect(project_root: &Path, source: ClientSource) -> Result<Self> {
        let paths = PathResolver::new(project_root, None)?;

        if !paths.config_path().exists() {
            return Err(ClientError::NotInitialized(paths.config_path().display().to_string()));
        }

        let socket_path = match paths.socket_path() {
            viberag_core::paths::SocketAddr::Unix(p) => p,
            viberag_core::paths::SocketAddr::NamedPipe(name) => {
                return Err(ClientError::SpawnFailed(format!("named pipe transport '{}' is not supported by this client build", name)));
            }
        };

        spawn::ensure_daemon_running(&paths, &socket_path, DAEMON_START_TIMEOUT).await?;

        let transport = Transport::connect(&socket_path).await?;
        Ok(Self { transport, source, timeout: DEFAULT_REQUEST_TIMEOUT })
    }

    /// Connect without attempting to spawn: fails fast if nothing is
    /// listening. Useful for tooling that only wants to probe liveness.
    pub async fn connect_existing(project_root: &Path) -> Result<Self> {
        let paths = PathResolver::new(project_root, None)?;
        let socket_path = match paths.socket_path() {
            viberag_core::paths::SocketAddr::Unix(p) => p,
            viberag_core::paths::SocketAddr::NamedPipe(name) => {
                return Err(ClientError::SpawnFailed(format!("named pipe transport '{}' is not supported by this client build", name)));
            }
        };
        let transport = Transport::connect(&socket_path).await?;
        Ok(Self { transport, source: ClientSource::Cli, timeout: DEFAULT_REQUEST_TIMEOUT })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `method` with `params`, tagging `__client` and enforcing the
    /// per-request timeout. The core primitive every typed wrapper below
    /// is built on.
    pub async fn call<P: Serialize>(&self, method: &str, params: P) -> Result<serde_json::Value> {
        let mut params = serde_json::to_value(params)?;
        if let Some(obj) = params.as_object_mut() {
            obj.insert("__client".to_string(), serde_json::json!({ "source": self.source.as_str() }));
        }
        tokio::time::timeout(self.timeout, self.transport.request(method, params))
            .await
            .map_err(|_| ClientError::RequestTimeout(self.timeout, method.to_string()))?
    }

    pub async fn ping(&self) -> Result<serde_json::Value> {
        self.call("ping", serde_json::json!({})).await
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        self.call("health", serde_json::json!({})).await
    }

    pub async fn status(&self) -> Result<serde_json::Value> {
        self.call("status", serde_json::json!({})).await
    }

    pub async fn watch_status(&self) -> Result<serde_json::Value> {
        self.call("watchStatus", serde_json::json!({})).await
    }

    pub async fn index(&self, force: bool, drop_cache: bool) -> Result<serde_json::Value> {
        self.call("index", serde_json::json!({ "force": force, "dropCache": drop_cache })).await
    }

    pub async fn index_async(&self, force: bool, drop_cache: bool) -> Result<String> {
        let result = self.call("indexAsync", serde_json::json!({ "force": force, "dropCache": drop_cache })).await?;
        result
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ClientError::MalformedResponse("indexAsync response missing 'id'".into()))
    }

    pub async fn search(&self, query: &str, options: serde_json::Value) -> Result<serde_json::Value> {
        self.call("search", serde_json::json!({ "query": query, "options": options })).await
    }

    pub async fn get_symbol(&self, symbol_id: &str) -> Result<serde_json::Value> {
        self.call("getSymbol", serde_json::json!({ "symbolId": symbol_id })).await
    }

    pub async fn find_usages(&self, token_text: &str, limit: usize) -> Result<serde_json::Value> {
        self.call("findUsages", serde_json::json!({ "tokenText": token_text, "limit": limit })).await
    }

    pub async fn expand_context(&self, table: &str, id: &str, window: usize) -> Result<serde_json::Value> {
        self.call("expandContext", serde_json::json!({ "table": table, "id": id, "window": window })).await
    }

    pub async fn eval(&self) -> Result<serde_json::Value> {
        self.call("eval", serde_json::json!({})).await
    }

    pub async fn cancel(&self, target: &str, reason: &str) -> Result<serde_json::Value> {
        self.call("cancel", serde_json::json!({ "target": target, "reason": reason })).await
    }

    pub async fn shutdown(&self, reason: &str) -> Result<serde_json::Value> {
        self.call("shutdown", serde_json::json!({ "reason": reason })).await
    }
}

/// Compute the daemon's socket path identically to the daemon itself,
/// without connecting. Used by tooling that only needs to display or
/// probe the path.
pub fn socket_path_for(project_root: &Path) -> Result<PathBuf> {
    let paths = PathResolver::new(project_root, None)?;
    match paths.socket_path() {
        viberag_core::paths::SocketAddr::Unix(p) => Ok(p),
        viberag_core::paths::SocketAddr::NamedPipe(name) => Err(ClientError::SpawnFailed(format!("named pipe transport '{}' unsupported", name))),
    }
}
