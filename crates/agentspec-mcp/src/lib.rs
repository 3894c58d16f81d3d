// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The MCP subprocess pool: spawns one child process per configured
//! `MCPServer` resource, speaks newline-delimited JSON-RPC over its stdio,
//! and exposes `list_tools`/`call_tool`/`close`.
//!
//! Built on sidecar-process supervision (`process.rs`'s
//! `ProcessConfig`/`ProcessStatus` lifecycle tracking, `pool.rs`'s pooled
//! registry of managed entries) re-targeted from a generic sidecar sandbox
//! to the MCP client/server handshake.

mod client;
mod pool;
mod process;

pub use client::{McpClient, McpClientConfig};
pub use pool::McpPool;
pub use process::{ProcessInfo, ProcessStatus};

/// Failures from the MCP subprocess pool.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The subprocess could not be spawned.
    #[error("failed to spawn MCP server {name:?}: {source}")]
    Spawn {
        /// The `MCPServer` resource name.
        name: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The subprocess exited or its stdio pipe closed mid-conversation.
    #[error("MCP server {name:?} crashed")]
    ServerCrashed {
        /// The `MCPServer` resource name.
        name: String,
    },
    /// The subprocess did not respond to a request within its timeout.
    #[error("MCP server {name:?} timed out on method {method:?}")]
    Timeout {
        /// The `MCPServer` resource name.
        name: String,
        /// The JSON-RPC method that timed out.
        method: String,
    },
    /// The server returned a JSON-RPC error object.
    #[error("MCP server {name:?} returned an error for {method:?}: {message}")]
    RpcError {
        /// The `MCPServer` resource name.
        name: String,
        /// The JSON-RPC method that failed.
        method: String,
        /// The error message from the server's error object.
        message: String,
    },
    /// Framing or transport failure.
    #[error(transparent)]
    Protocol(#[from] agentspec_protocol::ProtocolError),
    /// No client is registered under the given name.
    #[error("no MCP client registered for server {0:?}")]
    UnknownServer(String),
}
