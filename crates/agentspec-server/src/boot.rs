// SPDX-License-Identifier: MIT OR Apache-2.0
//! Turns a compiled [`Document`] plus a [`RuntimeConfig`] into a running
//! [`AppState`]: projects the document, wires up the tool registry (MCP,
//! HTTP, Command, Inline executors backed by `Skill` resources), connects
//! the MCP pool, resolves `Secret` resources, and builds the session store
//! and event bus the agentic runtime needs.
//!
//! This is the process-wiring counterpart to `agentspec_agent::project` —
//! that module turns IR into runtime *shapes*; this one turns those shapes
//! into live *services* (subprocess pools, HTTP clients, in-memory stores).

use agentspec_agent::{project, AgentRuntime, LlmClient, LlmError, LlmRequest, ProjectionError};
use agentspec_config::{RuntimeConfig, SecretError, SecretRegistry};
use agentspec_core::{Document, Resource, Value};
use agentspec_mcp::{McpClientConfig, McpError, McpPool};
use agentspec_runtime::bus::EventBus;
use agentspec_session::{
    InMemorySessionStore, Message, Role, SessionStore, Summarizer, TruncatingSummarizer, DEFAULT_SESSION_TTL_SECS,
};
use agentspec_telemetry::Redactor;
use agentspec_tools::{CanonicalToolDef, CommandSpec, Executor, HttpSpec, InlineSpec, McpSpec, ToolContext, ToolRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{parse_pipelines, AppState};

/// Failures assembling a runnable [`AppState`] from a document and config.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    /// The document failed projection into runtime shapes.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    /// A `Secret` resource's reference could not be resolved.
    #[error("secret {name:?}: {source}")]
    Secret {
        /// The `Secret` resource's name.
        name: String,
        /// The underlying resolution failure.
        #[source]
        source: SecretError,
    },
    /// An `MCPServer` resource failed to connect.
    #[error("mcp server {name:?}: {source}")]
    Mcp {
        /// The `MCPServer` resource's name.
        name: String,
        /// The underlying connection failure.
        #[source]
        source: McpError,
    },
    /// A `Skill` resource's `tool_config` attribute was malformed.
    #[error("skill {name:?}: {reason}")]
    BadSkill {
        /// The `Skill` resource's name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Everything [`boot`] produces: the router-ready [`AppState`] plus the
/// redactor every resolved secret has been registered with, so the caller
/// can scrub process-level log lines (bind address banners, config dumps)
/// before they're emitted.
pub struct BootOutput {
    /// The constructed application state, ready for [`crate::build_router`].
    pub state: AppState,
    /// Every `Secret` resource's resolved value, registered for redaction.
    pub redactor: Redactor,
}

/// Assemble a running [`AppState`] from a compiled document, process
/// config, and model backend.
///
/// `vault_root` roots `vault(path#key)` secret references; pass the
/// config's `state_dir` (or any directory) when no vault-backed secrets are
/// declared, since an empty registry never reads from it.
pub async fn boot(
    doc: &Document,
    config: &RuntimeConfig,
    vault_root: impl Into<std::path::PathBuf>,
    llm: Arc<dyn LlmClient>,
) -> Result<BootOutput, BootError> {
    let projected = project(doc)?;
    let redactor = Redactor::new();

    let secrets = resolve_secrets(doc, &redactor, vault_root)?;

    let mcp_pool = Arc::new(McpPool::new());
    for server in &projected.mcp_servers {
        let mcp_config = mcp_client_config(server, config)?;
        mcp_pool.connect(mcp_config).await.map_err(|source| BootError::Mcp { name: server.name.clone(), source })?;
    }

    let mut tools = ToolRegistry::new();
    for skill in &projected.skills {
        let (def, executor) = build_tool(skill)
            .map_err(|reason| BootError::BadSkill { name: skill.name.clone(), reason })?;
        tools.register(def, executor);
    }

    let tool_ctx = ToolContext { secrets, mcp_pool: Some(Arc::clone(&mcp_pool)) };

    let summarizer: Arc<dyn Summarizer> = Arc::new(LlmSummarizer { llm: Arc::clone(&llm) });
    let ttl = Duration::from_secs(DEFAULT_SESSION_TTL_SECS);
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(ttl, summarizer));

    let events = Arc::new(EventBus::new());

    let pipelines = Arc::new(parse_pipelines(&projected.pipelines));
    let metrics = Arc::new(agentspec_telemetry::MetricsCollector::new());

    let runtime = Arc::new(AgentRuntime::new(projected, tools, tool_ctx, Arc::clone(&sessions), llm, Some(events)));

    Ok(BootOutput {
        state: AppState { runtime, sessions, pipelines, metrics, started_at: Instant::now() },
        redactor,
    })
}

fn as_map(v: &Value) -> &BTreeMap<String, Value> {
    static EMPTY: std::sync::OnceLock<BTreeMap<String, Value>> = std::sync::OnceLock::new();
    v.as_map().unwrap_or_else(|| EMPTY.get_or_init(BTreeMap::new))
}

fn str_attr<'a>(attrs: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(Value::as_str)
}

fn string_list_attr(attrs: &BTreeMap<String, Value>, key: &str) -> Vec<String> {
    attrs
        .get(key)
        .and_then(Value::as_list)
        .map(|l| l.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn string_map_attr(attrs: &BTreeMap<String, Value>, key: &str) -> BTreeMap<String, String> {
    attrs
        .get(key)
        .and_then(Value::as_map)
        .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default()
}

fn int_attr(attrs: &BTreeMap<String, Value>, key: &str) -> Option<i64> {
    match attrs.get(key) {
        Some(Value::Int(i)) => Some(*i),
        _ => None,
    }
}

/// Resolve every `Secret` resource into a `name -> value` map, registering
/// each value with `redactor` as it is produced.
fn resolve_secrets(
    doc: &Document,
    redactor: &Redactor,
    vault_root: impl Into<std::path::PathBuf>,
) -> Result<BTreeMap<String, String>, BootError> {
    let registry = SecretRegistry::with_builtins(vault_root);
    let mut out = BTreeMap::new();
    for resource in &doc.resources {
        if resource.kind != agentspec_core::ResourceKind::Secret {
            continue;
        }
        let attrs = as_map(&resource.attributes);
        let Some(reference) = str_attr(attrs, "reference") else {
            continue;
        };
        let value = registry
            .resolve(reference)
            .map_err(|source| BootError::Secret { name: resource.name.clone(), source })?;
        redactor.register(value.clone());
        out.insert(resource.name.clone(), value);
    }
    Ok(out)
}

/// Build an MCP client config from an `MCPServer` resource's attributes,
/// with `RuntimeConfig.mcp_servers[name]` overriding `command`/`args`/
/// `timeout_ms` when present (the process-level pool-sizing escape hatch
/// a compiled document can't express).
fn mcp_client_config(server: &Resource, config: &RuntimeConfig) -> Result<McpClientConfig, BootError> {
    let attrs = as_map(&server.attributes);
    let override_entry = config.mcp_servers.get(&server.name);

    let command = override_entry
        .map(|e| e.command.clone())
        .or_else(|| str_attr(attrs, "command").map(str::to_string))
        .ok_or_else(|| BootError::Mcp {
            name: server.name.clone(),
            source: McpError::UnknownServer(server.name.clone()),
        })?;
    let args = override_entry.map(|e| e.args.clone()).unwrap_or_else(|| string_list_attr(attrs, "args"));
    let env = string_map_attr(attrs, "env");
    let working_dir = str_attr(attrs, "working_dir").map(std::path::PathBuf::from);
    let timeout = override_entry
        .and_then(agentspec_config::McpServerEntry::timeout)
        .or_else(|| int_attr(attrs, "timeout_ms").filter(|t| *t > 0).map(|t| Duration::from_millis(t as u64)))
        .unwrap_or_else(|| Duration::from_secs(10));

    Ok(McpClientConfig {
        name: server.name.clone(),
        command,
        args,
        env,
        working_dir,
        startup_timeout: timeout,
        request_timeout: timeout,
    })
}

/// Parse a `Skill` resource's `tool_config` attribute into a registered
/// tool definition and executor.
///
/// Expected shape (all keys live under `tool_config`, sibling to the
/// skill's `description`):
/// ```text
/// tool_config: {
///   type: "mcp" | "http" | "command" | "inline",
///   parameters_schema?: <JSON Schema object>,
///   # mcp
///   server, tool,
///   # http
///   method, url, headers?, body?, timeout_ms?,
///   # command
///   binary, args?, env?, stdin?, timeout_ms?, max_output_bytes?,
///   # inline
///   code,
/// }
/// ```
fn build_tool(skill: &Resource) -> Result<(CanonicalToolDef, Executor), String> {
    let attrs = as_map(&skill.attributes);
    let description = str_attr(attrs, "description").unwrap_or("").to_string();
    let parameters_schema = attrs
        .get("tool_config")
        .and_then(Value::as_map)
        .and_then(|tc| tc.get("parameters_schema"))
        .map(serde_json::Value::from)
        .unwrap_or_else(|| serde_json::json!({"type": "object"}));

    let tool_config = attrs
        .get("tool_config")
        .and_then(Value::as_map)
        .ok_or_else(|| "missing tool_config attribute".to_string())?;

    let kind = str_attr(tool_config, "type").ok_or_else(|| "tool_config.type is required".to_string())?;

    let executor = match kind {
        "mcp" => Executor::Mcp(McpSpec {
            server: str_attr(tool_config, "server").ok_or("tool_config.server is required")?.to_string(),
            tool: str_attr(tool_config, "tool").ok_or("tool_config.tool is required")?.to_string(),
        }),
        "http" => Executor::Http(HttpSpec {
            method: str_attr(tool_config, "method").unwrap_or("GET").to_string(),
            url: str_attr(tool_config, "url").ok_or("tool_config.url is required")?.to_string(),
            headers: string_map_attr(tool_config, "headers"),
            body: str_attr(tool_config, "body").map(str::to_string),
            timeout: timeout_attr(tool_config).unwrap_or_else(|| Duration::from_secs(30)),
        }),
        "command" => Executor::Command(CommandSpec {
            binary: str_attr(tool_config, "binary").ok_or("tool_config.binary is required")?.to_string(),
            args: string_list_attr(tool_config, "args"),
            env: string_map_attr(tool_config, "env"),
            stdin: str_attr(tool_config, "stdin").map(str::to_string),
            timeout: timeout_attr(tool_config).unwrap_or_else(|| Duration::from_secs(30)),
            max_output_bytes: int_attr(tool_config, "max_output_bytes")
                .filter(|t| *t > 0)
                .map(|t| t as usize)
                .unwrap_or(1024 * 1024),
        }),
        "inline" => Executor::Inline(InlineSpec {
            code: str_attr(tool_config, "code").ok_or("tool_config.code is required")?.to_string(),
        }),
        other => return Err(format!("unknown tool_config.type {other:?}")),
    };

    Ok((
        CanonicalToolDef { name: skill.name.clone(), description, parameters_schema },
        executor,
    ))
}

fn timeout_attr(tool_config: &BTreeMap<String, Value>) -> Option<Duration> {
    int_attr(tool_config, "timeout_ms").filter(|t| *t > 0).map(|t| Duration::from_millis(t as u64))
}

/// Summarizes session history through the configured [`LlmClient`] rather
/// than the truncating placeholder, by asking the model for a plain-text
/// digest of the oldest messages. Falls back to [`TruncatingSummarizer`]'s
/// behavior if the model call itself fails — a summarization failure must
/// never block the turn that triggered it.
struct LlmSummarizer {
    llm: Arc<dyn LlmClient>,
}

#[async_trait::async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, messages: &[Message]) -> String {
        let mut prompt = String::from(
            "Summarize the following conversation history concisely, preserving facts and decisions:\n\n",
        );
        for m in messages {
            prompt.push_str(&format!("[{}] {}\n", m.role.as_str(), m.content));
        }
        let request = LlmRequest {
            model: "summarizer".to_string(),
            messages: vec![Message::new(Role::User, prompt)],
            tools: vec![],
            temperature: Some(0.0),
        };
        match self.llm.complete(request).await {
            Ok(response) if !response.text.trim().is_empty() => response.text,
            _ => TruncatingSummarizer::default().summarize(messages).await,
        }
    }
}
