// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Structured telemetry for AgentSpec: per-run metrics and aggregation,
//! correlation IDs threaded through a request/invocation, and a secret-aware
//! log redactor.
//!
//! `agentspec-runtime::telemetry` and `agentspec-runtime::observe` cover
//! in-process counters and span collection for a single run; this crate is
//! the layer above that: turning those into exportable summaries, stamping
//! every log line with a correlation ID, and scrubbing known secret values
//! out of anything about to be logged or exported.

mod correlation;
mod metrics;
mod redact;

pub use correlation::CorrelationId;
pub use metrics::{
    percentile, JsonExporter, MetricsCollector, MetricsSummary, PrometheusExporter, RunMetrics, TelemetryExporter,
};
pub use redact::{Redactor, REDACTED_PLACEHOLDER};

/// A structured span for tracing integration, distinct from
/// `agentspec-runtime::observe::Span` (which tracks parent/child nesting
/// in-process) — this one is a flat, exportable event: one `tracing::info!`
/// call per span, attributes rendered through the redactor first.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySpan {
    /// Span name / operation.
    pub name: String,
    /// Arbitrary key-value attributes (deterministic ordering).
    pub attributes: std::collections::BTreeMap<String, String>,
}

impl TelemetrySpan {
    /// Create a new span with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: std::collections::BTreeMap::new(),
        }
    }

    /// Insert an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Emit the span via `tracing::info!`, running attribute values through
    /// `redactor` first.
    pub fn emit(&self, redactor: &Redactor) {
        let scrubbed: std::collections::BTreeMap<&String, String> = self
            .attributes
            .iter()
            .map(|(k, v)| (k, redactor.redact(v)))
            .collect();
        tracing::info!(span_name = %self.name, attributes = ?scrubbed, "telemetry_span");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_span_attributes() {
        let span = TelemetrySpan::new("op").with_attribute("key", "val").with_attribute("another", "thing");
        assert_eq!(span.name, "op");
        assert_eq!(span.attributes.len(), 2);
        assert_eq!(span.attributes["key"], "val");
    }

    #[test]
    fn telemetry_span_serde_roundtrip() {
        let span = TelemetrySpan::new("run").with_attribute("agent", "acme/agent/bot");
        let json = serde_json::to_string(&span).unwrap();
        let span2: TelemetrySpan = serde_json::from_str(&json).unwrap();
        assert_eq!(span2.name, "run");
        assert_eq!(span2.attributes["agent"], "acme/agent/bot");
    }

    #[test]
    fn telemetry_span_emit_redacts_registered_secrets() {
        let redactor = Redactor::new();
        redactor.register("sk-live-abc123");
        let span = TelemetrySpan::new("tool_call").with_attribute("auth", "sk-live-abc123");
        // emit() only logs; this test asserts the redaction step itself,
        // since tracing output isn't captured here.
        let scrubbed = redactor.redact(&span.attributes["auth"]);
        assert_eq!(scrubbed, REDACTED_PLACEHOLDER);
    }
}
