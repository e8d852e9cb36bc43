//! Newline-delimited JSON-RPC transport over a Unix domain socket: one
//! connection, one in-flight request at a time (spec §4.12, §4.14).
//!
//! The daemon may interleave responses across different connections, but
//! within a single connection it answers requests in the order they were
//! sent, so a simple request/response lock-step is sufficient here; a
//! future multiplexing client could track `id -> pending` instead.

use std::path::Path;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

use crate::error::{ClientError, Result};

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: serde_json::Value,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    code: i64,
    message: String,
}

pub struct Transport {
    conn: Mutex<Conn>,
}

struct Conn {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
    next_id: u64,
}

impl Transport {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| ClientError::Io(std::io::Error::new(e.kind(), format!("connecting to {}: {}", socket_path.display(), e))))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self { conn: Mutex::new(Conn { reader: BufReader::new(read_half), writer: write_half, next_id: 1 }) })
    }

    pub async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let mut conn = self.conn.lock().await;
        let id = conn.next_id;
        conn.next_id += 1;

        let request = serde_json::json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        conn.writer.write_all(line.as_bytes()).await?;
        conn.writer.flush().await?;

        let mut response_line = String::new();
        let n = conn.reader.read_line(&mut response_line).await?;
        if n == 0 {
            return Err(ClientError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "daemon closed the connection")));
        }

        let response: RawResponse = serde_json::from_str(response_line.trim_end()).map_err(|e| ClientError::MalformedResponse(e.to_string()))?;

        if let Some(err) = response.error {
            return Err(ClientError::Rpc { code: err.code, message: err.message });
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}
