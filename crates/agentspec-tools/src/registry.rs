// SPDX-License-Identifier: MIT OR Apache-2.0
//! `tool_name -> (definition, executor)` with idempotent registration.

use crate::{CanonicalToolDef, Executor, ToolContext, ToolError};
use serde_json::Value;
use std::collections::BTreeMap;

/// One registered tool: its public definition plus the executor backing it.
pub struct ToolRegistryEntry {
    /// The definition surfaced to the LLM.
    pub definition: CanonicalToolDef,
    /// The executor invoked on a tool call.
    pub executor: Executor,
}

/// The process-wide tool registry.
///
/// Concurrent `execute` calls on different tool names are independent.
/// Same-MCP-tool concurrency serializes through the MCP pool's per-client
/// lock (`agentspec_mcp::McpClient::call`), not here — the registry itself
/// holds no lock across a call.
#[derive(Default)]
pub struct ToolRegistry {
    entries: BTreeMap<String, ToolRegistryEntry>,
}

impl ToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        ToolRegistry { entries: BTreeMap::new() }
    }

    /// Register a tool, overwriting any existing entry under the same name.
    pub fn register(&mut self, definition: CanonicalToolDef, executor: Executor) {
        let name = definition.name.clone();
        self.entries.insert(name, ToolRegistryEntry { definition, executor });
    }

    /// Remove a tool from the registry, if present.
    pub fn unregister(&mut self, name: &str) -> Option<ToolRegistryEntry> {
        self.entries.remove(name)
    }

    /// The number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The definitions of every registered tool, for inclusion in an LLM
    /// call's tool list.
    pub fn definitions(&self) -> impl Iterator<Item = &CanonicalToolDef> {
        self.entries.values().map(|e| &e.definition)
    }

    /// Execute a tool by name.
    pub async fn execute(&self, ctx: &ToolContext, name: &str, input: Value) -> Result<String, ToolError> {
        let entry = self.entries.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        entry.executor.execute(ctx, name, input).await
    }
}
