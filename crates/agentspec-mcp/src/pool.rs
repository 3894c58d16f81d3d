// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pool of live MCP clients, keyed by `MCPServer` resource name.

use crate::client::{McpClient, McpClientConfig};
use crate::McpError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Owns every spawned MCP subprocess for one runtime instance.
///
/// There is no auto-restart on crash: a crashed server stays absent from
/// the pool until `connect` is called again for it.
#[derive(Default)]
pub struct McpPool {
    clients: RwLock<BTreeMap<String, Arc<McpClient>>>,
}

impl McpPool {
    /// An empty pool.
    #[must_use]
    pub fn new() -> Self {
        McpPool { clients: RwLock::new(BTreeMap::new()) }
    }

    /// Spawn and register a client for the given configuration, replacing
    /// any existing client under the same name.
    pub async fn connect(&self, config: McpClientConfig) -> Result<(), McpError> {
        let name = config.name.clone();
        let client = McpClient::spawn(config).await?;
        let mut clients = self.clients.write().await;
        if let Some(old) = clients.insert(name, client) {
            old.close(DEFAULT_CLOSE_GRACE).await;
        }
        Ok(())
    }

    /// List tools exposed by the named server.
    pub async fn list_tools(&self, server: &str) -> Result<Value, McpError> {
        self.client(server).await?.list_tools().await
    }

    /// Call a tool on the named server.
    pub async fn call_tool(&self, server: &str, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        let client = self.client(server).await?;
        let result = client.call_tool(tool_name, arguments).await;
        if matches!(result, Err(McpError::ServerCrashed { .. })) {
            self.clients.write().await.remove(server);
        }
        result
    }

    async fn client(&self, server: &str) -> Result<Arc<McpClient>, McpError> {
        self.clients
            .read()
            .await
            .get(server)
            .cloned()
            .ok_or_else(|| McpError::UnknownServer(server.to_string()))
    }

    /// Close one server's client, if connected.
    pub async fn close(&self, server: &str) {
        if let Some(client) = self.clients.write().await.remove(server) {
            client.close(DEFAULT_CLOSE_GRACE).await;
        }
    }

    /// Close every connected client. Used on server shutdown.
    pub async fn close_all(&self) {
        let clients: Vec<_> = self.clients.write().await.drain().map(|(_, c)| c).collect();
        for client in clients {
            client.close(DEFAULT_CLOSE_GRACE).await;
        }
    }

    /// The set of currently connected server names.
    pub async fn connected_servers(&self) -> Vec<String> {
        self.clients.read().await.keys().cloned().collect()
    }
}
