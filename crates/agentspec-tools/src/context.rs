// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-invocation context threaded through tool execution.

use agentspec_mcp::McpPool;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Resolved secret values and the shared MCP pool, made available to
/// executors without threading them through every call signature.
#[derive(Clone, Default)]
pub struct ToolContext {
    /// Resolved secret values, keyed by `Secret` resource name.
    pub secrets: BTreeMap<String, String>,
    /// The shared MCP client pool, if any MCP-backed tools are registered.
    pub mcp_pool: Option<Arc<McpPool>>,
}
