// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The tool registry: `tool_name -> (definition, executor)`, with MCP,
//! HTTP, Command, and Inline executor variants behind one
//! `execute(ctx, input) -> Result<String, ToolError>` interface.
//!
//! The tool definition schema shape is generalized with an executor enum,
//! plus the subprocess-supervision patterns from `agentspec-mcp`'s process
//! handling for the Command variant.

mod context;
mod executor;
mod registry;

pub use context::ToolContext;
pub use executor::{CommandSpec, Executor, HttpSpec, InlineSpec, McpSpec};
pub use registry::{ToolRegistry, ToolRegistryEntry};

use serde::{Deserialize, Serialize};

/// A vendor-agnostic tool definition: name, description, and JSON Schema
/// parameters — the contract surfaced to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalToolDef {
    /// Tool name, unique within a registry.
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters_schema: serde_json::Value,
}

const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Failures from tool lookup or execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// No tool is registered under the given name.
    #[error("tool {0:?} is not registered")]
    NotFound(String),
    /// An HTTP executor received a non-2xx response.
    #[error("tool HTTP call returned {status}: {body}")]
    HttpError {
        /// The response status code.
        status: u16,
        /// The response body, truncated to the output cap.
        body: String,
    },
    /// A command executor's subprocess exited non-zero.
    #[error("tool command exited with {exit}: {stderr}")]
    CommandError {
        /// The process exit code, if the OS reported one.
        exit: i32,
        /// Captured stderr, truncated to the output cap.
        stderr: String,
    },
    /// An executor did not finish within its configured timeout.
    #[error("tool {0:?} timed out")]
    Timeout(String),
    /// Output exceeded the configured size cap.
    #[error("tool {0:?} output exceeded the size cap")]
    OutputTooLarge(String),
    /// The MCP pool reported a failure routing the call.
    #[error(transparent)]
    Mcp(#[from] agentspec_mcp::McpError),
    /// Transport-level failure performing an HTTP call.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// Failure spawning or communicating with a command subprocess.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_def(name: &str) -> CanonicalToolDef {
        CanonicalToolDef {
            name: name.to_string(),
            description: "a test tool".to_string(),
            parameters_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn registration_is_idempotent_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(sample_def("echo"), Executor::Inline(InlineSpec { code: "return input".into() }));
        assert_eq!(registry.len(), 1);
        registry.register(sample_def("echo"), Executor::Inline(InlineSpec { code: "return 2".into() }));
        assert_eq!(registry.len(), 1, "re-registration overwrites rather than duplicating");
    }

    #[tokio::test]
    async fn execute_unknown_tool_reports_not_found() {
        let registry = ToolRegistry::new();
        let ctx = ToolContext::default();
        let err = registry.execute(&ctx, "missing", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn command_executor_captures_stdout() {
        let mut registry = ToolRegistry::new();
        registry.register(
            sample_def("echo_cmd"),
            Executor::Command(CommandSpec {
                binary: "echo".to_string(),
                args: vec!["hello".to_string()],
                env: Default::default(),
                stdin: None,
                timeout: std::time::Duration::from_secs(2),
                max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            }),
        );
        let ctx = ToolContext::default();
        let out = registry.execute(&ctx, "echo_cmd", serde_json::json!({})).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn command_executor_nonzero_exit_reports_command_error() {
        let mut registry = ToolRegistry::new();
        registry.register(
            sample_def("fail_cmd"),
            Executor::Command(CommandSpec {
                binary: "sh".to_string(),
                args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
                env: Default::default(),
                stdin: None,
                timeout: std::time::Duration::from_secs(2),
                max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            }),
        );
        let ctx = ToolContext::default();
        let err = registry.execute(&ctx, "fail_cmd", serde_json::json!({})).await.unwrap_err();
        match err {
            ToolError::CommandError { exit, stderr } => {
                assert_eq!(exit, 3);
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected CommandError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn command_executor_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register(
            sample_def("slow_cmd"),
            Executor::Command(CommandSpec {
                binary: "sleep".to_string(),
                args: vec!["5".to_string()],
                env: Default::default(),
                stdin: None,
                timeout: std::time::Duration::from_millis(50),
                max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            }),
        );
        let ctx = ToolContext::default();
        let err = registry.execute(&ctx, "slow_cmd", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }
}
