// ============================
// crates/common/src/lib.rs
// ============================
//! Wire types shared by the TrueNAS password portal.
//! This module defines the JSON-RPC 2.0 envelope spoken on the
//! TrueNAS WebSocket API and the user payloads both API transports exchange.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version tag
pub const JSONRPC_VERSION: &str = "2.0";

/// Request frame sent to the middleware
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    /// Always `"2.0"`
    pub jsonrpc: String,
    /// Correlation identifier echoed back by the server
    pub id: String,
    /// Method name, e.g. `user.query`
    pub method: String,
    /// Positional parameters
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Build a request with positional parameters
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Response (or notification) frame received from the middleware
///
/// Notifications carry no `id`; callers skip them while waiting for the
/// response matching their request.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Whether this frame answers the request with the given id
    pub fn answers(&self, request_id: &str) -> bool {
        match &self.id {
            Some(Value::String(id)) => id == request_id,
            Some(Value::Number(n)) => n.to_string() == request_id,
            _ => false,
        }
    }

    /// Successful response carrying `result`
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(Value::String(id.into())),
            result: Some(result),
            error: None,
        }
    }

    /// Error response carrying `error`
    pub fn failure(id: impl Into<String>, error: RpcError) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(Value::String(id.into())),
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RpcErrorData>,
}

/// TrueNAS-specific error details attached to `error.data`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RpcErrorData {
    /// errno-style name such as `ENOENT` or `EINVAL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errname: Option<String>,
    /// Human readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Validation errors as `[attribute, message, errno]` triples
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<Value>,
}

/// The subset of a TrueNAS `user` entry the portal reads
///
/// Both the REST `/user` endpoint and `user.query` return this shape;
/// unknown fields are ignored.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserRecord {
    /// Database id used by the update calls
    pub id: u64,
    pub username: String,
    /// Crypt-style password hash, absent for accounts without a password
    #[serde(default)]
    pub unixhash: Option<String>,
    /// Whether SMB authentication is enabled for the account
    #[serde(default)]
    pub smb: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub password_disabled: bool,
    /// Logins to the account need a one-time code as well
    #[serde(default)]
    pub twofactor_auth_configured: bool,
}

/// Body of a password update (`PUT /user/id/{id}` or `user.update`)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PasswordUpdate {
    pub password: String,
}

/// Build the `user.query` filter matching exactly one username
pub fn username_filter(username: &str) -> Value {
    serde_json::json!([["username", "=", username]])
}
