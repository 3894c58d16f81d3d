// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle tracking for a managed MCP subprocess.

use std::time::Instant;

/// Runtime status of a managed MCP server process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process is running and has completed its handshake.
    Running,
    /// The process exited normally with the given code.
    Exited {
        /// The process exit code, if the OS reported one.
        code: Option<i32>,
    },
    /// The process was killed by the pool, either on request or after a
    /// crash was detected.
    Killed,
}

/// Lifecycle metadata for one pooled MCP client.
#[derive(Clone, Debug)]
pub struct ProcessInfo {
    /// The `MCPServer` resource name this process backs.
    pub name: String,
    /// Current process status.
    pub status: ProcessStatus,
    /// When the process was spawned.
    pub started_at: Instant,
}
