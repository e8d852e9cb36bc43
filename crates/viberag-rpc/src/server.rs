//! Unix-domain-socket JSON-RPC server: accepts connections, frames lines,
//! dispatches to a [`RpcHandler`], and writes back responses (spec §4.12).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{read_line, LineOutcome};
use crate::error::{RpcErrorObject, Result as RpcResult};
use crate::protocol::{extract_client_tag, ClientTag, Request, Response};

/// Implemented by the daemon to answer one RPC call. `params` has already
/// had its `__client` tag extracted and passed separately.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(
        &self,
        method: &str,
        params: serde_json::Value,
        client: ClientTag,
    ) -> std::result::Result<serde_json::Value, RpcErrorObject>;
}

/// Binds `socket_path` and serves connections until `shutdown` fires.
/// Removes any stale socket file at the same path before binding: the
/// daemon owner is responsible for verifying no other process is
/// listening there first (spec §4.13 step 4).
pub async fn serve_unix(
    socket_path: &Path,
    handler: Arc<dyn RpcHandler>,
    shutdown: CancellationToken,
) -> RpcResult<()> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "rpc server listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                let handler = handler.clone();
                let conn_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    serve_connection(stream, handler, conn_shutdown).await;
                });
            }
            _ = shutdown.cancelled() => {
                info!("rpc server shutting down");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    Ok(())
}

async fn serve_connection(stream: UnixStream, handler: Arc<dyn RpcHandler>, shutdown: CancellationToken) {
    let (read_half, write_half) = tokio::io::split(stream);
    if let Err(e) = connection_loop(read_half, write_half, handler, shutdown).await {
        debug!(error = %e, "rpc connection ended");
    }
}

async fn connection_loop(
    mut reader: ReadHalf<UnixStream>,
    mut writer: WriteHalf<UnixStream>,
    handler: Arc<dyn RpcHandler>,
    shutdown: CancellationToken,
) -> RpcResult<()> {
    let mut pending = Vec::new();

    loop {
        let outcome = tokio::select! {
            outcome = read_line(&mut reader, &mut pending) => outcome?,
            _ = shutdown.cancelled() => return Ok(()),
        };

        match outcome {
            LineOutcome::Eof => return Ok(()),
            LineOutcome::TooLong => {
                let resp = Response::failure(serde_json::Value::Null, RpcErrorObject::parse_error("line exceeds maximum size"));
                write_response(&mut writer, &resp).await?;
                return Ok(());
            }
            LineOutcome::Line(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = dispatch_line(&line, &handler).await;
                write_response(&mut writer, &response).await?;
            }
        }
    }
}

async fn dispatch_line(line: &str, handler: &Arc<dyn RpcHandler>) -> Response {
    let mut request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "failed to parse request line");
            return Response::failure(serde_json::Value::Null, RpcErrorObject::parse_error(e.to_string()));
        }
    };

    if request.jsonrpc != "2.0" {
        return Response::failure(
            request.id,
            RpcErrorObject::new(crate::error::codes::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        );
    }

    let client = extract_client_tag(&mut request.params);

    match handler.handle(&request.method, request.params, client).await {
        Ok(result) => Response::success(request.id, result),
        Err(err) => Response::failure(request.id, err),
    }
}

async fn write_response(writer: &mut WriteHalf<UnixStream>, response: &Response) -> RpcResult<()> {
    let mut serialized = serde_json::to_string(response).map_err(|e| crate::error::RpcError::Parse(e.to_string()))?;
    serialized.push('\n');
    writer.write_all(serialized.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, BufReader};

    struct EchoHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RpcHandler for EchoHandler {
        async fn handle(
            &self,
            method: &str,
            params: serde_json::Value,
            _client: ClientTag,
        ) -> std::result::Result<serde_json::Value, RpcErrorObject> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if method == "boom" {
                return Err(RpcErrorObject::internal("boom"));
            }
            Ok(serde_json::json!({ "method": method, "echo": params }))
        }
    }

    #[tokio::test]
    async fn serves_a_request_and_strips_client_tag() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let handler = Arc::new(EchoHandler { calls: AtomicUsize::new(0) });
        let shutdown = CancellationToken::new();

        let server_socket = socket_path.clone();
        let server_shutdown = shutdown.clone();
        let server_handler = handler.clone();
        let server = tokio::spawn(async move {
            serve_unix(&server_socket, server_handler, server_shutdown).await.unwrap();
        });

        // give the listener a moment to bind
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let request = serde_json::json!({
            "jsonrpc": "2.0", "id": 1, "method": "ping",
            "params": { "__client": { "source": "cli" } }
        });
        let mut line = serde_json::to_string(&request).unwrap();
        line.push('\n');
        stream.write_all(line.as_bytes()).await.unwrap();

        let (read_half, _write_half) = stream.split();
        let mut reader = BufReader::new(read_half);
        let mut response_line = String::new();
        reader.read_line(&mut response_line).await.unwrap();

        let response: serde_json::Value = serde_json::from_str(&response_line).unwrap();
        assert_eq!(response["result"]["method"], "ping");
        assert_eq!(response["result"]["echo"], serde_json::json!({}));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        let _ = server.await;
    }
}
