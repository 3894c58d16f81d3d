// SPDX-License-Identifier: MIT OR Apache-2.0
//! A single plugin subprocess: one stdio transport, one mutex serializing
//! requests, JSON-RPC framing reused from the MCP transport (`manifest`,
//! `validate_{name}`, `transform_{name}`, `hook_{name}` are just method
//! names over the same newline-delimited JSON-RPC wire format).

use crate::PluginError;
use agentspec_protocol::{RequestId, RpcMessage, RpcRequest, StreamingCodec};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

/// Configuration for spawning one plugin subprocess.
#[derive(Clone, Debug)]
pub struct PluginConfig {
    /// The plugin's name, used in error messages and as its registry key.
    pub name: String,
    /// The command to execute.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Additional environment variables.
    pub env: BTreeMap<String, String>,
    /// The working directory for the subprocess, if not the parent's.
    pub working_dir: Option<PathBuf>,
    /// How long to wait for a response to any single call, including the
    /// initial `manifest` call.
    pub call_timeout: Duration,
}

/// A plugin's declared capabilities, fetched via its `manifest` call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginManifest {
    /// Validator capability names, invoked as `validate_{name}`.
    #[serde(default)]
    pub validators: Vec<String>,
    /// Transform capability names, invoked as `transform_{name}`, applied
    /// in the order listed here.
    #[serde(default)]
    pub transforms: Vec<String>,
    /// Hook capability names, invoked as `hook_{name}`.
    #[serde(default)]
    pub hooks: Vec<String>,
}

struct Io {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A live connection to one plugin subprocess, with its manifest already
/// fetched at spawn time.
pub struct PluginProcess {
    config: PluginConfig,
    child: Mutex<Child>,
    io: Mutex<Io>,
    next_id: AtomicI64,
    manifest: PluginManifest,
}

impl PluginProcess {
    /// Spawn the configured command and fetch its manifest.
    ///
    /// A plugin that traps, hangs, or is killed by the OS (OOM) during this
    /// call surfaces as a [`PluginError`] — the host process is never at
    /// risk, since the failure is confined to the child.
    pub async fn spawn(config: PluginConfig) -> Result<Arc<Self>, PluginError> {
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

        let mut child = cmd.spawn().map_err(|source| PluginError {
            name: config.name.clone(),
            cause: format!("failed to spawn: {source}"),
        })?;
        let stdin = child.stdin.take().expect("stdin piped");
        let stdout = child.stdout.take().expect("stdout piped");

        let process = PluginProcess {
            config: config.clone(),
            child: Mutex::new(child),
            io: Mutex::new(Io { stdin, stdout: BufReader::new(stdout) }),
            next_id: AtomicI64::new(1),
            manifest: PluginManifest::default(),
        };

        let manifest_value = process.call("manifest", Value::Null).await?;
        let manifest: PluginManifest = serde_json::from_value(manifest_value).map_err(|source| PluginError {
            name: config.name.clone(),
            cause: format!("malformed manifest: {source}"),
        })?;

        Ok(Arc::new(PluginProcess { manifest, ..process }))
    }

    /// The plugin's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The plugin's declared capabilities.
    #[must_use]
    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// Send one JSON-RPC call and wait for its matching response.
    ///
    /// Holds the transport mutex for the full write+read round trip, same
    /// single-outstanding-request discipline as the MCP client.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, PluginError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(RequestId::Number(id), method, params);
        let line = StreamingCodec::encode(&RpcMessage::Request(request));

        let mut io = self.io.lock().await;
        let round_trip = async {
            io.stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|_| self.crashed())?;
            io.stdin.flush().await.map_err(|_| self.crashed())?;

            let mut buf = String::new();
            loop {
                buf.clear();
                let n = io.stdout.read_line(&mut buf).await.map_err(|_| self.crashed())?;
                if n == 0 {
                    return Err(self.crashed());
                }
                let trimmed = buf.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                let message = StreamingCodec::decode(trimmed).map_err(|source| PluginError {
                    name: self.config.name.clone(),
                    cause: source.to_string(),
                })?;
                if let RpcMessage::Response(resp) = message {
                    if resp.id == RequestId::Number(id) {
                        return Ok(resp);
                    }
                    continue;
                }
            }
        };

        let response = tokio::time::timeout(self.config.call_timeout, round_trip).await.map_err(|_| PluginError {
            name: self.config.name.clone(),
            cause: format!("timed out calling {method:?}"),
        })??;

        if let Some(error) = response.error {
            return Err(PluginError {
                name: self.config.name.clone(),
                cause: format!("{method:?} returned an error: {}", error.message),
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    fn crashed(&self) -> PluginError {
        PluginError { name: self.config.name.clone(), cause: "subprocess crashed or closed its stdio".to_string() }
    }

    /// Invoke `validate_{name}` and parse its result as an array of error
    /// strings.
    pub async fn validate(&self, name: &str, resource: Value) -> Result<Vec<String>, PluginError> {
        let result = self.call(&format!("validate_{name}"), resource).await?;
        serde_json::from_value(result).map_err(|source| PluginError {
            name: self.config.name.clone(),
            cause: format!("validate_{name} returned a non-array result: {source}"),
        })
    }

    /// Invoke `transform_{name}` and return the modified resource.
    pub async fn transform(&self, name: &str, resource: Value) -> Result<Value, PluginError> {
        self.call(&format!("transform_{name}"), resource).await
    }

    /// Invoke `hook_{name}`. A `null` response means the hook has nothing
    /// to contribute.
    pub async fn hook(&self, name: &str, context: Value) -> Result<Option<Value>, PluginError> {
        let result = self.call(&format!("hook_{name}"), context).await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    /// Close the connection: drop stdin (EOF), wait briefly, then escalate
    /// to a hard kill.
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
