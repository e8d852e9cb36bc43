//! JSON-RPC 2.0 envelope types (spec §4.12).
//!
//! Each line on the wire is one complete `{jsonrpc, id, method, params}`
//! request object or `{jsonrpc, id, result|error}` response object.

use serde::{Deserialize, Serialize};

use crate::error::RpcErrorObject;

pub const JSONRPC_VERSION: &str = "2.0";

/// A received request. `params` still contains an unstripped `__client`
/// tag, if present; call [`extract_client_tag`] before dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl Response {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id, result: Some(result), error: None }
    }

    pub fn failure(id: serde_json::Value, error: RpcErrorObject) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id, result: None, error: Some(error) }
    }
}

/// Which shell invoked this request, tagged by the client library so
/// handlers can rate-shape or attribute metrics without it polluting
/// `params` seen by business logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientSource {
    Cli,
    Mcp,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClientTag {
    pub source: Option<ClientSource>,
}

/// Strips the `__client` key out of `params` (if `params` is an object)
/// and returns the parsed tag, defaulting to an empty tag when absent or
/// malformed. Mutates `params` in place so handlers never see the key.
pub fn extract_client_tag(params: &mut serde_json::Value) -> ClientTag {
    let Some(obj) = params.as_object_mut() else {
        return ClientTag::default();
    };
    match obj.remove("__client") {
        Some(value) => serde_json::from_value(value).unwrap_or_default(),
        None => ClientTag::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_tag_is_stripped_and_parsed() {
        let mut params = serde_json::json!({ "query": "foo", "__client": { "source": "cli" } });
        let tag = extract_client_tag(&mut params);
        assert_eq!(tag.source, Some(ClientSource::Cli));
        assert_eq!(params, serde_json::json!({ "query": "foo" }));
    }

    #[test]
    fn missing_client_tag_defaults_to_none() {
        let mut params = serde_json::json!({ "query": "foo" });
        let tag = extract_client_tag(&mut params);
        assert!(tag.source.is_none());
    }

    #[test]
    fn non_object_params_are_left_untouched() {
        let mut params = serde_json::json!("not an object");
        let tag = extract_client_tag(&mut params);
        assert!(tag.source.is_none());
        assert_eq!(params, serde_json::json!("not an object"));
    }

    #[test]
    fn response_success_serializes_without_error_field() {
        let resp = Response::success(serde_json::json!(1), serde_json::json!({"ok": true}));
        let s = serde_json::to_string(&resp).unwrap();
        assert!(!s.contains("\"error\""));
    }
}
