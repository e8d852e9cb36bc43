//! viberag-rpc: newline-delimited JSON-RPC 2.0 framing, wire types and a
//! Unix-domain-socket server used by the VibeRAG daemon (spec §4.12).

pub mod codec;
pub mod error;
pub mod protocol;
pub mod server;

pub use error::{codes, RpcError, RpcErrorObject, Result};
pub use protocol::{ClientSource, ClientTag, Request, Response, JSONRPC_VERSION};
pub use server::{serve_unix, RpcHandler};
