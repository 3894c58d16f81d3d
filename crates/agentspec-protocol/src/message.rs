// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-RPC 2.0 message shapes used over the MCP stdio transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC request ID: either a number or a string, per JSON-RPC 2.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric ID, the common case for this implementation's own clients.
    Number(i64),
    /// String ID, accepted from servers that prefer it.
    Text(String),
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// The JSON-RPC error code.
    pub code: i64,
    /// A short human-readable message.
    pub message: String,
    /// Optional structured error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An outbound JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    jsonrpc: JsonRpcVersion,
    /// The correlation ID this response must echo back.
    pub id: RequestId,
    /// The method name, e.g. `tools/list` or `tools/call`.
    pub method: String,
    /// The method's parameters.
    pub params: Value,
}

impl RpcRequest {
    /// Build a new request with the fixed `"2.0"` version tag.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        RpcRequest { jsonrpc: JsonRpcVersion, id, method: method.into(), params }
    }
}

/// An inbound JSON-RPC response, either a result or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    jsonrpc: JsonRpcVersion,
    /// The ID this response answers.
    pub id: RequestId,
    /// The successful result, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error, if present. Exactly one of `result`/`error` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// A one-way notification: no `id`, no response expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    jsonrpc: JsonRpcVersion,
    /// The notification method name.
    pub method: String,
    /// The notification's parameters.
    pub params: Value,
}

/// Any of the three JSON-RPC frame shapes this transport exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcMessage {
    /// A request expecting a matching response.
    Request(RpcRequest),
    /// A response to a previously sent request.
    Response(RpcResponse),
    /// A notification with no expected response.
    Notification(RpcNotification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        if s == "2.0" {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!("unsupported jsonrpc version {s:?}")))
        }
    }
}
