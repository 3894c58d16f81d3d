// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output formatting utilities for the AgentSpec CLI.

use agentspec_agent::runtime::InvocationOutcome;
use agentspec_plan::{Action, ActionType, ApplyOutcome, ApplyResult};
use agentspec_runtime::event::{Outcome, RuntimeEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported output formats for CLI display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Compact JSON (single line).
    Json,
    /// Pretty-printed JSON.
    JsonPretty,
    /// Human-readable multi-line text.
    Text,
    /// Key-value aligned table.
    Table,
    /// Single-line summary.
    Compact,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
            Self::Text => "text",
            Self::Table => "table",
            Self::Compact => "compact",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "json-pretty" | "json_pretty" | "jsonpretty" => Ok(Self::JsonPretty),
            "text" => Ok(Self::Text),
            "table" => Ok(Self::Table),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Formats AgentSpec contract types for CLI output.
#[derive(Debug, Clone)]
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Create a new formatter with the given output format.
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format an [`InvocationOutcome`] according to the configured output format.
    #[must_use]
    pub fn format_outcome(&self, outcome: &InvocationOutcome) -> String {
        match &self.format {
            OutputFormat::Json => outcome_json(outcome).to_string(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&outcome_json(outcome)).unwrap_or_default(),
            OutputFormat::Text => format_outcome_text(outcome),
            OutputFormat::Table => format_outcome_table(outcome),
            OutputFormat::Compact => format_outcome_compact(outcome),
        }
    }

    /// Format a [`RuntimeEvent`] according to the configured output format.
    #[must_use]
    pub fn format_event(&self, event: &RuntimeEvent) -> String {
        match &self.format {
            OutputFormat::Json => serde_json::to_string(event).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(event).unwrap_or_default(),
            OutputFormat::Text => format_event_text(event),
            OutputFormat::Table => format_event_table(event),
            OutputFormat::Compact => format_event_compact(event),
        }
    }

    /// Format an [`Action`] (one line of a `plan` run) according to the configured output format.
    #[must_use]
    pub fn format_action(&self, action: &Action) -> String {
        match &self.format {
            OutputFormat::Json => serde_json::to_string(action).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(action).unwrap_or_default(),
            OutputFormat::Text => format_action_text(action),
            OutputFormat::Table => format_action_table(action),
            OutputFormat::Compact => format_action_compact(action),
        }
    }

    /// Format an [`ApplyResult`] according to the configured output format.
    #[must_use]
    pub fn format_apply_result(&self, result: &ApplyResult) -> String {
        match &self.format {
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => format_apply_result_text(result),
            OutputFormat::Table => format_apply_result_table(result),
            OutputFormat::Compact => format_apply_result_compact(result),
        }
    }

    /// Format an error message according to the configured output format.
    #[must_use]
    pub fn format_error(&self, err: &str) -> String {
        match &self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => serde_json::json!({"error": err}).to_string(),
            OutputFormat::Text => format!("Error: {err}"),
            OutputFormat::Table => format!("error  {err}"),
            OutputFormat::Compact => format!("[error] {err}"),
        }
    }
}

// ── Text helpers ──────────────────────────────────────────────────────

fn outcome_str(o: Outcome) -> &'static str {
    match o {
        Outcome::Success => "success",
        Outcome::Failed => "failed",
        Outcome::Cancelled => "cancelled",
        Outcome::BudgetExceeded => "budget_exceeded",
    }
}

fn action_type_str(t: ActionType) -> &'static str {
    t.as_str()
}

fn apply_outcome_str(o: &ApplyOutcome) -> &'static str {
    match o {
        ApplyOutcome::Success => "success",
        ApplyOutcome::Failed => "failed",
        ApplyOutcome::Skipped => "skipped",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max])
    }
}

fn event_kind_tag(event: &RuntimeEvent) -> &'static str {
    match event {
        RuntimeEvent::Token { .. } => "token",
        RuntimeEvent::ToolCall { .. } => "tool_call",
        RuntimeEvent::ToolResult { .. } => "tool_result",
        RuntimeEvent::Error { .. } => "error",
        RuntimeEvent::Done { .. } => "done",
    }
}

fn event_brief(event: &RuntimeEvent) -> String {
    match event {
        RuntimeEvent::Token { text } => truncate(text, 60),
        RuntimeEvent::ToolCall { tool, .. } => format!("call {tool}"),
        RuntimeEvent::ToolResult { call_id, success, .. } => {
            if *success {
                format!("{call_id} (ok)")
            } else {
                format!("{call_id} (error)")
            }
        }
        RuntimeEvent::Error { message } => truncate(message, 60),
        RuntimeEvent::Done { outcome } => outcome_str(*outcome).to_string(),
    }
}

/// `InvocationOutcome` carries non-`Serialize` fields (tool-call durations,
/// activity traces), so JSON output is built from a plain value rather than
/// a derive, the way `agentspec-server`'s `InvokeResponse` does for the HTTP
/// API.
fn outcome_json(o: &InvocationOutcome) -> serde_json::Value {
    serde_json::json!({
        "run_id": o.receipt.run_id.to_string(),
        "agent_fqn": o.receipt.agent_fqn,
        "outcome": outcome_str(o.receipt.outcome),
        "output": o.output,
        "turns_used": o.receipt.turns_used,
        "input_tokens": o.input_tokens,
        "output_tokens": o.output_tokens,
        "tool_calls": o.tool_calls.len(),
        "duration_ms": o.receipt.duration_ms,
        "receipt_sha256": o.receipt.receipt_sha256,
    })
}

// ── InvocationOutcome formatters ───────────────────────────────────────

fn format_outcome_text(o: &InvocationOutcome) -> String {
    format!(
        "Outcome: {}\nAgent: {}\nTurns: {}\nTokens: {} in / {} out\nDuration: {}ms\nOutput: {}",
        outcome_str(o.receipt.outcome),
        o.receipt.agent_fqn,
        o.receipt.turns_used,
        o.input_tokens,
        o.output_tokens,
        o.receipt.duration_ms,
        truncate(&o.output, 200),
    )
}

fn format_outcome_table(o: &InvocationOutcome) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{:<12} {}", "outcome", outcome_str(o.receipt.outcome)));
    lines.push(format!("{:<12} {}", "agent", o.receipt.agent_fqn));
    lines.push(format!("{:<12} {}", "turns", o.receipt.turns_used));
    lines.push(format!("{:<12} {} / {}", "tokens", o.input_tokens, o.output_tokens));
    lines.push(format!("{:<12} {}ms", "duration", o.receipt.duration_ms));
    lines.push(format!("{:<12} {}", "tool_calls", o.tool_calls.len()));
    lines.push(format!("{:<12} {}", "run_id", o.receipt.run_id));
    lines.push(format!("{:<12} {}", "sha256", o.receipt.receipt_sha256));
    lines.join("\n")
}

fn format_outcome_compact(o: &InvocationOutcome) -> String {
    format!(
        "[{}] agent={} turns={} tokens={}/{}",
        outcome_str(o.receipt.outcome),
        o.receipt.agent_fqn,
        o.receipt.turns_used,
        o.input_tokens,
        o.output_tokens,
    )
}

// ── RuntimeEvent formatters ─────────────────────────────────────────────

fn format_event_text(ev: &RuntimeEvent) -> String {
    let tag = event_kind_tag(ev);
    let brief = event_brief(ev);
    format!("{tag}: {brief}")
}

fn format_event_table(ev: &RuntimeEvent) -> String {
    let tag = event_kind_tag(ev);
    let brief = event_brief(ev);
    format!("{:<16} {}", tag, brief)
}

fn format_event_compact(ev: &RuntimeEvent) -> String {
    let tag = event_kind_tag(ev);
    let brief = event_brief(ev);
    format!("[{tag}] {brief}")
}

// ── Action / ApplyResult formatters ─────────────────────────────────────

fn format_action_text(a: &Action) -> String {
    match &a.reason {
        Some(reason) => format!("FQN: {}\nAction: {}\nReason: {reason}", a.fqn, action_type_str(a.action_type)),
        None => format!("FQN: {}\nAction: {}", a.fqn, action_type_str(a.action_type)),
    }
}

fn format_action_table(a: &Action) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{:<8} {}", action_type_str(a.action_type), a.fqn));
    if let Some(ref reason) = a.reason {
        lines.push(format!("{:<8} {reason}", ""));
    }
    lines.join("\n")
}

fn format_action_compact(a: &Action) -> String {
    match &a.reason {
        Some(reason) => format!("[{}] {} ({reason})", action_type_str(a.action_type), a.fqn),
        None => format!("[{}] {}", action_type_str(a.action_type), a.fqn),
    }
}

fn format_apply_result_text(r: &ApplyResult) -> String {
    let mut out =
        format!("FQN: {}\nAction: {}\nStatus: {}", r.fqn, action_type_str(r.action_type), apply_outcome_str(&r.status));
    if let Some(ref artifact) = r.artifact {
        out.push_str(&format!("\nArtifact: {artifact}"));
    }
    if let Some(ref error) = r.error {
        out.push_str(&format!("\nError: {error}"));
    }
    out
}

fn format_apply_result_table(r: &ApplyResult) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{:<10} {}", apply_outcome_str(&r.status), r.fqn));
    if let Some(ref artifact) = r.artifact {
        lines.push(format!("{:<10} {artifact}", "artifact"));
    }
    if let Some(ref error) = r.error {
        lines.push(format!("{:<10} {error}", "error"));
    }
    lines.join("\n")
}

fn format_apply_result_compact(r: &ApplyResult) -> String {
    match (&r.artifact, &r.error) {
        (Some(artifact), _) => format!("[{}] {} -> {artifact}", apply_outcome_str(&r.status), r.fqn),
        (None, Some(error)) => format!("[{}] {} ({error})", apply_outcome_str(&r.status), r.fqn),
        (None, None) => format!("[{}] {}", apply_outcome_str(&r.status), r.fqn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_display_roundtrips() {
        for fmt in &[OutputFormat::Json, OutputFormat::JsonPretty, OutputFormat::Text, OutputFormat::Table, OutputFormat::Compact] {
            let s = fmt.to_string();
            let parsed: OutputFormat = s.parse().unwrap();
            assert_eq!(&parsed, fmt);
        }
    }

    #[test]
    fn output_format_from_str_rejects_unknown() {
        assert!("nope".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_long_string() {
        let long = "a".repeat(100);
        let t = truncate(&long, 10);
        assert!(t.len() < 100);
        assert!(t.ends_with('…'));
    }

    #[test]
    fn format_event_compact_shows_tag_and_brief() {
        let ev = RuntimeEvent::ToolCall { call_id: "c1".into(), tool: "myapp/Skill/search".into(), args: serde_json::json!({}) };
        let formatter = Formatter::new(OutputFormat::Compact);
        assert_eq!(formatter.format_event(&ev), "[tool_call] call myapp/Skill/search");
    }

    #[test]
    fn format_error_json_wraps_message() {
        let formatter = Formatter::new(OutputFormat::Json);
        let s = formatter.format_error("boom");
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["error"], "boom");
    }

    #[test]
    fn format_action_compact_includes_reason() {
        let resource = agentspec_core::Resource::new(
            "pkg",
            agentspec_core::ResourceKind::Prompt,
            "p1",
            agentspec_core::Value::Map(Default::default()),
            vec![],
        );
        let action = Action {
            fqn: resource.fqn.clone(),
            kind: resource.kind,
            action_type: ActionType::Create,
            resource_snapshot: Some(resource),
            prev_hash: None,
            reason: Some("new resource".into()),
        };
        let formatter = Formatter::new(OutputFormat::Compact);
        let s = formatter.format_action(&action);
        assert!(s.contains("create"));
        assert!(s.contains("new resource"));
    }
}
