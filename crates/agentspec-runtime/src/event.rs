// SPDX-License-Identifier: MIT OR Apache-2.0
//! The streaming event taxonomy emitted by a running invocation.
//!
//! These are the payloads an SSE (or any other push transport) connection
//! forwards to a caller while an agent turn is in flight: incremental model
//! output, tool call/result pairs, terminal errors, and the final `done`
//! marker carrying the run's outcome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One event emitted during an invocation's execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RuntimeEvent {
    /// An incremental chunk of model-generated text.
    Token {
        /// The text chunk.
        text: String,
    },
    /// The agent invoked a tool.
    ToolCall {
        /// Tool call identifier, used to pair with the matching `ToolResult`.
        call_id: String,
        /// Fully-qualified tool name.
        tool: String,
        /// Arguments passed to the tool.
        args: serde_json::Value,
    },
    /// A tool call returned a result.
    ToolResult {
        /// Matches the originating `ToolCall::call_id`.
        call_id: String,
        /// Whether the tool call succeeded.
        success: bool,
        /// The tool's output (or error payload, if `success` is `false`).
        output: serde_json::Value,
    },
    /// A non-fatal or fatal error occurred during the run.
    Error {
        /// Human-readable error message.
        message: String,
    },
    /// The invocation has finished; no further events follow.
    Done {
        /// The final outcome.
        outcome: Outcome,
    },
}

/// The terminal outcome of an invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The agent completed its turn loop and produced a final response.
    Success,
    /// The agent raised an unrecoverable error.
    Failed,
    /// The run was cancelled before completion.
    Cancelled,
    /// A budget dimension (tokens, turns, cost, duration) was exhausted.
    BudgetExceeded,
}

impl Outcome {
    /// Whether this outcome represents a successful completion.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Extracts the serde tag (`"type"`) from a [`RuntimeEvent`] for routing.
#[must_use]
pub fn event_kind_name(event: &RuntimeEvent) -> Option<String> {
    let value = serde_json::to_value(event).ok()?;
    value.get("type").and_then(|v| v.as_str()).map(String::from)
}

/// Arbitrary string-keyed metadata carried alongside an event or invocation.
pub type Attributes = BTreeMap<String, String>;
