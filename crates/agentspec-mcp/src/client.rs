// SPDX-License-Identifier: MIT OR Apache-2.0
//! A single MCP client: one subprocess, one stdio transport, one mutex
//! serializing requests.

use crate::process::{ProcessInfo, ProcessStatus};
use crate::McpError;
use agentspec_protocol::{RequestId, RpcMessage, RpcRequest, StreamingCodec};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

/// Configuration for spawning one MCP server subprocess (from an `MCPServer`
/// resource's attributes).
#[derive(Clone, Debug)]
pub struct McpClientConfig {
    /// The `MCPServer` resource name, used in error messages and logs.
    pub name: String,
    /// The command to execute.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Additional environment variables.
    pub env: BTreeMap<String, String>,
    /// The working directory for the subprocess, if not the parent's.
    pub working_dir: Option<PathBuf>,
    /// How long to wait for the process to spawn and become reachable.
    pub startup_timeout: Duration,
    /// How long to wait for a response to any single request.
    pub request_timeout: Duration,
}

struct Io {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A live connection to one MCP server subprocess.
pub struct McpClient {
    config: McpClientConfig,
    child: Mutex<Child>,
    io: Mutex<Io>,
    next_id: AtomicI64,
    started_at: Instant,
}

impl McpClient {
    /// Spawn the configured command and hold its stdio pipes open. Does not
    /// perform an MCP handshake beyond establishing the transport — the
    /// first real request doubles as the readiness probe.
    pub async fn spawn(config: McpClientConfig) -> Result<Arc<Self>, McpError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &config.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn { name: config.name.clone(), source })?;
        let stdin = child.stdin.take().expect("stdin piped");
        let stdout = child.stdout.take().expect("stdout piped");

        Ok(Arc::new(McpClient {
            config,
            child: Mutex::new(child),
            io: Mutex::new(Io { stdin, stdout: BufReader::new(stdout) }),
            next_id: AtomicI64::new(1),
            started_at: Instant::now(),
        }))
    }

    /// The server name this client backs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Snapshot the process's lifecycle metadata.
    pub async fn info(&self) -> ProcessInfo {
        let status = {
            let mut child = self.child.lock().await;
            match child.try_wait() {
                Ok(Some(exit)) => ProcessStatus::Exited { code: exit.code() },
                Ok(None) => ProcessStatus::Running,
                Err(_) => ProcessStatus::Exited { code: None },
            }
        };
        ProcessInfo { name: self.config.name.clone(), status, started_at: self.started_at }
    }

    /// Send one JSON-RPC request and wait for its matching response.
    ///
    /// Holds the transport mutex for the full write+read round trip —
    /// only one request is outstanding per client at a time, avoiding the
    /// need to demultiplex interleaved responses by ID.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(RequestId::Number(id), method, params);
        let line = StreamingCodec::encode(&RpcMessage::Request(request));

        let mut io = self.io.lock().await;
        let round_trip = async {
            io.stdin.write_all(line.as_bytes()).await.map_err(|_| McpError::ServerCrashed {
                name: self.config.name.clone(),
            })?;
            io.stdin.flush().await.map_err(|_| McpError::ServerCrashed { name: self.config.name.clone() })?;

            let mut buf = String::new();
            loop {
                buf.clear();
                let n = io.stdout.read_line(&mut buf).await.map_err(|_| McpError::ServerCrashed {
                    name: self.config.name.clone(),
                })?;
                if n == 0 {
                    return Err(McpError::ServerCrashed { name: self.config.name.clone() });
                }
                let trimmed = buf.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                let message = StreamingCodec::decode(trimmed)?;
                if let RpcMessage::Response(resp) = message {
                    if resp.id == RequestId::Number(id) {
                        return Ok(resp);
                    }
                    // Response to a stale request (shouldn't happen given the
                    // single-outstanding-request discipline); keep reading.
                    continue;
                }
                // Notifications interleaved before our response; skip them.
            }
        };

        let response = tokio::time::timeout(self.config.request_timeout, round_trip)
            .await
            .map_err(|_| McpError::Timeout { name: self.config.name.clone(), method: method.to_string() })??;

        if let Some(error) = response.error {
            return Err(McpError::RpcError {
                name: self.config.name.clone(),
                method: method.to_string(),
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// List the tools this server exposes.
    pub async fn list_tools(&self) -> Result<Value, McpError> {
        self.call("tools/list", serde_json::json!({})).await
    }

    /// Invoke one tool by name with the given arguments.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        self.call("tools/call", serde_json::json!({ "name": tool_name, "arguments": arguments })).await
    }

    /// Close the connection: drop the stdin handle (signalling EOF, the
    /// conventional shutdown cue for a stdio MCP server), wait briefly for
    /// the process to exit on its own, then escalate to a hard kill.
    pub async fn close(&self, grace: Duration) {
        {
            let mut io = self.io.lock().await;
            let _ = io.stdin.shutdown().await;
        }
        let mut child = self.child.lock().await;
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}
