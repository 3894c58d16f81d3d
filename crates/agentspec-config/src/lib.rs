// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-level runtime configuration, environment variable overrides, and
//! the secret resolver contract.
//!
//! This crate provides [`RuntimeConfig`] — server/runtime settings that are
//! not part of a compiled [`agentspec_core::Document`] (bind address, body
//! limit, default turn/window sizes, pool sizing) — together with loading
//! from TOML, merging overlays, advisory [`ConfigWarning`]s, and the
//! [`SecretResolver`] registry used to turn `env(NAME)` / `vault(path#key)`
//! references into values.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod env;
mod secret;

pub use env::{env_override, env_override_with_prefix};
pub use secret::{EnvSecretResolver, SecretError, SecretResolver, SecretRegistry, VaultSecretResolver};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// Two configs could not be merged because of conflicting constraints.
    #[error("merge conflict: {reason}")]
    MergeConflict {
        /// Description of the conflict.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A deprecated field was used in the configuration.
    DeprecatedField {
        /// Name of the deprecated field.
        field: String,
        /// Suggested replacement, if any.
        suggestion: Option<String>,
    },
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// An MCP server's spawn timeout is unusually large.
    LargeTimeout {
        /// MCP server name.
        server: String,
        /// Timeout value in seconds.
        secs: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::DeprecatedField { field, suggestion } => {
                write!(f, "deprecated field '{field}'")?;
                if let Some(s) = suggestion {
                    write!(f, " — use '{s}' instead")?;
                }
                Ok(())
            }
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeTimeout { server, secs } => {
                write!(f, "mcp server '{server}' has a large spawn timeout ({secs}s)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level process settings for the runtime/server, separate from
/// anything a compiled document can express.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Address the HTTP server binds to, e.g. `"0.0.0.0:8080"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,

    /// Directory used for the desired-state file and session store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Maximum accepted HTTP request body size in bytes.
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: u64,

    /// Maximum bytes captured from a tool's stdout before truncation.
    #[serde(default = "default_tool_output_cap_bytes")]
    pub tool_output_cap_bytes: u64,

    /// Default maximum agentic-loop turns when an agent doesn't override it.
    #[serde(default = "default_max_turns")]
    pub default_max_turns: u32,

    /// Default streaming preference for agent runs.
    #[serde(default = "default_stream")]
    pub default_stream: bool,

    /// Default sliding-window message count for session memory.
    #[serde(default = "default_sliding_window_max_messages")]
    pub default_sliding_window_max_messages: u32,

    /// Named MCP subprocess pool entries (spawn command + timeout).
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerEntry>,

    /// The API key clients must present via `X-API-Key` or `Authorization:
    /// Bearer`. `None` means the server requires `no_auth` to be set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Explicitly disable authentication. Starting the server with neither
    /// `api_key` set nor this flag is a configuration error. Defaults to
    /// `true` so an unconfigured server is usable out of the box; set
    /// `api_key` to turn auth on.
    #[serde(default = "default_no_auth")]
    pub no_auth: bool,

    /// Per-agent token-bucket rate limit: sustained requests per second.
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: u32,

    /// Per-agent token-bucket rate limit: maximum burst size.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
}

fn default_body_limit_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_tool_output_cap_bytes() -> u64 {
    1024 * 1024
}

fn default_max_turns() -> u32 {
    10
}

fn default_stream() -> bool {
    true
}

fn default_sliding_window_max_messages() -> u32 {
    50
}

fn default_rate_limit_rps() -> u32 {
    5
}

fn default_rate_limit_burst() -> u32 {
    20
}

fn default_no_auth() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: None,
            state_dir: None,
            log_level: Some("info".into()),
            body_limit_bytes: default_body_limit_bytes(),
            tool_output_cap_bytes: default_tool_output_cap_bytes(),
            default_max_turns: default_max_turns(),
            default_stream: default_stream(),
            default_sliding_window_max_messages: default_sliding_window_max_messages(),
            mcp_servers: BTreeMap::new(),
            api_key: None,
            no_auth: default_no_auth(),
            rate_limit_rps: default_rate_limit_rps(),
            rate_limit_burst: default_rate_limit_burst(),
        }
    }
}

/// Pool sizing and spawn settings for one named MCP server entry.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct McpServerEntry {
    /// Command to spawn.
    pub command: String,
    /// Extra CLI arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional spawn/handshake timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl McpServerEntry {
    /// The spawn/handshake timeout as a [`Duration`], if set.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed MCP server spawn timeout, in seconds (24 hours).
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Threshold above which a spawn timeout generates a warning.
const LARGE_TIMEOUT_THRESHOLD_SECS: u64 = 3_600;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`RuntimeConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`RuntimeConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => RuntimeConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`RuntimeConfig`].
pub fn parse_toml(content: &str) -> Result<RuntimeConfig, ConfigError> {
    toml::from_str::<RuntimeConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `AGENTSPEC_BIND_ADDR`
/// - `AGENTSPEC_LOG_LEVEL`
/// - `AGENTSPEC_STATE_DIR`
/// - `AGENTSPEC_API_KEY`
pub fn apply_env_overrides(config: &mut RuntimeConfig) {
    if let Some(val) = env_override(None, "BIND_ADDR") {
        config.bind_addr = Some(val);
    }
    if let Some(val) = env_override(None, "LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Some(val) = env_override(None, "STATE_DIR") {
        config.state_dir = Some(val);
    }
    if let Some(val) = env_override(None, "API_KEY") {
        config.api_key = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (empty MCP server commands, out-of-range timeouts) are
/// returned as a [`ConfigError::ValidationError`]; soft issues come back as
/// warnings.
pub fn validate_config(config: &RuntimeConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if config.body_limit_bytes == 0 {
        errors.push("body_limit_bytes must be greater than zero".into());
    }

    if config.api_key.is_none() && !config.no_auth {
        errors.push("either api_key must be set or no_auth must be enabled".into());
    }

    if config.rate_limit_rps == 0 {
        errors.push("rate_limit_rps must be greater than zero".into());
    }
    if config.rate_limit_burst == 0 {
        errors.push("rate_limit_burst must be greater than zero".into());
    }

    for (name, server) in &config.mcp_servers {
        if name.is_empty() {
            errors.push("mcp server name must not be empty".into());
        }
        if server.command.trim().is_empty() {
            errors.push(format!("mcp server '{name}': command must not be empty"));
        }
        if let Some(t) = server.timeout() {
            let secs = t.as_secs();
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                errors.push(format!(
                    "mcp server '{name}': timeout {secs}s out of range (1..{MAX_TIMEOUT_SECS})"
                ));
            } else if secs > LARGE_TIMEOUT_THRESHOLD_SECS {
                warnings.push(ConfigWarning::LargeTimeout {
                    server: name.clone(),
                    secs,
                });
            }
        }
    }

    if config.bind_addr.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "bind_addr".into(),
            hint: "the server will fall back to its own built-in default address".into(),
        });
    }
    if config.state_dir.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "state_dir".into(),
            hint: "desired-state and session files will not be persisted to disk".into(),
        });
    }
    if config.no_auth {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "api_key".into(),
            hint: "no_auth is enabled; every request is accepted unauthenticated".into(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// MCP server maps are combined; on name collisions the overlay entry wins.
pub fn merge_configs(base: RuntimeConfig, overlay: RuntimeConfig) -> RuntimeConfig {
    let mut mcp_servers = base.mcp_servers;
    mcp_servers.extend(overlay.mcp_servers);
    RuntimeConfig {
        bind_addr: overlay.bind_addr.or(base.bind_addr),
        state_dir: overlay.state_dir.or(base.state_dir),
        log_level: overlay.log_level.or(base.log_level),
        body_limit_bytes: if overlay.body_limit_bytes == default_body_limit_bytes() {
            base.body_limit_bytes
        } else {
            overlay.body_limit_bytes
        },
        tool_output_cap_bytes: if overlay.tool_output_cap_bytes == default_tool_output_cap_bytes() {
            base.tool_output_cap_bytes
        } else {
            overlay.tool_output_cap_bytes
        },
        default_max_turns: if overlay.default_max_turns == default_max_turns() {
            base.default_max_turns
        } else {
            overlay.default_max_turns
        },
        default_stream: overlay.default_stream,
        default_sliding_window_max_messages: if overlay.default_sliding_window_max_messages
            == default_sliding_window_max_messages()
        {
            base.default_sliding_window_max_messages
        } else {
            overlay.default_sliding_window_max_messages
        },
        mcp_servers,
        api_key: overlay.api_key.or(base.api_key),
        no_auth: overlay.no_auth,
        rate_limit_rps: if overlay.rate_limit_rps == default_rate_limit_rps() {
            base.rate_limit_rps
        } else {
            overlay.rate_limit_rps
        },
        rate_limit_burst: if overlay.rate_limit_burst == default_rate_limit_burst() {
            base.rate_limit_burst
        } else {
            overlay.rate_limit_burst
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
