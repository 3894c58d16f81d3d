// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-run metrics, thread-safe collection, and aggregation into a summary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Metrics captured for a single agentic-loop run or pipeline step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunMetrics {
    /// Fully-qualified name of the agent that ran.
    pub agent_fqn: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Total number of runtime events emitted.
    pub events_count: u64,
    /// Inbound token count.
    pub tokens_in: u64,
    /// Outbound token count.
    pub tokens_out: u64,
    /// Number of tool calls made.
    pub tool_calls_count: u64,
    /// Number of errors encountered.
    pub errors_count: u64,
}

/// Aggregated statistics across multiple runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    /// Number of runs recorded.
    pub count: usize,
    /// Mean duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Median (p50) duration in milliseconds.
    pub p50_duration_ms: f64,
    /// 99th-percentile duration in milliseconds.
    pub p99_duration_ms: f64,
    /// Total inbound tokens across all runs.
    pub total_tokens_in: u64,
    /// Total outbound tokens across all runs.
    pub total_tokens_out: u64,
    /// Error rate (errors / total runs).
    pub error_rate: f64,
    /// Per-agent run counts (deterministic ordering).
    pub agent_counts: BTreeMap<String, usize>,
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self {
            count: 0,
            mean_duration_ms: 0.0,
            p50_duration_ms: 0.0,
            p99_duration_ms: 0.0,
            total_tokens_in: 0,
            total_tokens_out: 0,
            error_rate: 0.0,
            agent_counts: BTreeMap::new(),
        }
    }
}

/// Compute a percentile value from a **sorted** slice.
pub fn percentile(sorted: &[u64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] as f64 * (1.0 - frac) + sorted[upper] as f64 * frac
}

/// Thread-safe collector for run metrics.
///
/// Wrap in an `Arc` to share across threads (the inner storage is already
/// behind a `Mutex`).
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Vec<RunMetrics>>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new, empty collector.
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Record a completed run's metrics.
    pub fn record(&self, metrics: RunMetrics) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.push(metrics);
    }

    /// Return all recorded run metrics.
    pub fn runs(&self) -> Vec<RunMetrics> {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.clone()
    }

    /// Number of runs recorded so far.
    pub fn len(&self) -> usize {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.len()
    }

    /// Whether the collector has no recorded runs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute an aggregated summary of all recorded runs.
    pub fn summary(&self) -> MetricsSummary {
        let data = self.inner.lock().expect("metrics lock poisoned");
        if data.is_empty() {
            return MetricsSummary::default();
        }

        let count = data.len();
        let mut durations: Vec<u64> = data.iter().map(|r| r.duration_ms).collect();
        durations.sort_unstable();

        let total_duration: u64 = durations.iter().sum();
        let mean_duration_ms = total_duration as f64 / count as f64;
        let p50_duration_ms = percentile(&durations, 50.0);
        let p99_duration_ms = percentile(&durations, 99.0);

        let total_tokens_in: u64 = data.iter().map(|r| r.tokens_in).sum();
        let total_tokens_out: u64 = data.iter().map(|r| r.tokens_out).sum();

        let errors: u64 = data.iter().map(|r| r.errors_count).sum();
        let error_rate = errors as f64 / count as f64;

        let mut agent_counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in data.iter() {
            *agent_counts.entry(r.agent_fqn.clone()).or_insert(0) += 1;
        }

        MetricsSummary {
            count,
            mean_duration_ms,
            p50_duration_ms,
            p99_duration_ms,
            total_tokens_in,
            total_tokens_out,
            error_rate,
            agent_counts,
        }
    }

    /// Clear all recorded metrics.
    pub fn clear(&self) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.clear();
    }
}

/// Trait for exporting collected metrics.
pub trait TelemetryExporter: Send + Sync {
    /// Export the given summary. Returns the serialized output on success.
    fn export(&self, summary: &MetricsSummary) -> Result<String, String>;
}

/// Exports metrics as pretty-printed JSON to a string.
#[derive(Debug, Default)]
pub struct JsonExporter;

impl TelemetryExporter for JsonExporter {
    fn export(&self, summary: &MetricsSummary) -> Result<String, String> {
        serde_json::to_string_pretty(summary).map_err(|e| e.to_string())
    }
}

/// Exports metrics in Prometheus text exposition format (the shape a
/// `GET /v1/metrics` handler writes to the response body with content type
/// `text/plain; version=0.0.4`).
#[derive(Debug, Default)]
pub struct PrometheusExporter;

fn write_gauge(out: &mut String, name: &str, help: &str, value: f64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    out.push_str(&format!("{name} {value}\n"));
}

impl TelemetryExporter for PrometheusExporter {
    fn export(&self, summary: &MetricsSummary) -> Result<String, String> {
        let mut out = String::new();
        write_gauge(&mut out, "agentspec_runs_total", "Total number of recorded runs.", summary.count as f64);
        write_gauge(
            &mut out,
            "agentspec_run_duration_ms_mean",
            "Mean run duration in milliseconds.",
            summary.mean_duration_ms,
        );
        write_gauge(
            &mut out,
            "agentspec_run_duration_ms_p50",
            "Median run duration in milliseconds.",
            summary.p50_duration_ms,
        );
        write_gauge(
            &mut out,
            "agentspec_run_duration_ms_p99",
            "99th-percentile run duration in milliseconds.",
            summary.p99_duration_ms,
        );
        write_gauge(
            &mut out,
            "agentspec_tokens_in_total",
            "Total inbound tokens across all recorded runs.",
            summary.total_tokens_in as f64,
        );
        write_gauge(
            &mut out,
            "agentspec_tokens_out_total",
            "Total outbound tokens across all recorded runs.",
            summary.total_tokens_out as f64,
        );
        write_gauge(&mut out, "agentspec_error_rate", "Fraction of recorded runs that errored.", summary.error_rate);

        out.push_str("# HELP agentspec_agent_runs_total Runs recorded per agent.\n");
        out.push_str("# TYPE agentspec_agent_runs_total counter\n");
        for (agent_fqn, count) in &summary.agent_counts {
            out.push_str(&format!(
                "agentspec_agent_runs_total{{agent_fqn=\"{}\"}} {count}\n",
                escape_label_value(agent_fqn)
            ));
        }
        Ok(out)
    }
}

fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sample_metrics(agent: &str, duration: u64, errors: u64) -> RunMetrics {
        RunMetrics {
            agent_fqn: agent.to_string(),
            duration_ms: duration,
            events_count: 5,
            tokens_in: 100,
            tokens_out: 200,
            tool_calls_count: 3,
            errors_count: errors,
        }
    }

    #[test]
    fn collector_new_is_empty() {
        let c = MetricsCollector::new();
        assert!(c.is_empty());
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn collector_record_and_len() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("mock", 100, 0));
        assert_eq!(c.len(), 1);
        assert!(!c.is_empty());
    }

    #[test]
    fn collector_runs_returns_all() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("a", 10, 0));
        c.record(sample_metrics("b", 20, 0));
        let runs = c.runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].agent_fqn, "a");
        assert_eq!(runs[1].agent_fqn, "b");
    }

    #[test]
    fn collector_clear() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("x", 50, 0));
        c.clear();
        assert!(c.is_empty());
    }

    #[test]
    fn empty_collector_summary() {
        let c = MetricsCollector::new();
        let s = c.summary();
        assert_eq!(s.count, 0);
        assert_eq!(s.mean_duration_ms, 0.0);
        assert!(s.agent_counts.is_empty());
    }

    #[test]
    fn single_run_summary_matches() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("mock", 42, 0));
        let s = c.summary();
        assert_eq!(s.count, 1);
        assert_eq!(s.mean_duration_ms, 42.0);
        assert_eq!(s.total_tokens_in, 100);
        assert_eq!(s.agent_counts["mock"], 1);
    }

    #[test]
    fn summary_mean_duration() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("a", 100, 0));
        c.record(sample_metrics("a", 200, 0));
        c.record(sample_metrics("a", 300, 0));
        let s = c.summary();
        assert!((s.mean_duration_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_p50_odd_count() {
        let c = MetricsCollector::new();
        for d in [10, 20, 30, 40, 50] {
            c.record(sample_metrics("a", d, 0));
        }
        let s = c.summary();
        assert!((s.p50_duration_ms - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_error_rate() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("a", 10, 1));
        c.record(sample_metrics("a", 20, 0));
        c.record(sample_metrics("a", 30, 2));
        let s = c.summary();
        assert!((s.error_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_agent_counts() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("alpha", 10, 0));
        c.record(sample_metrics("beta", 20, 0));
        c.record(sample_metrics("alpha", 30, 0));
        let s = c.summary();
        assert_eq!(s.agent_counts["alpha"], 2);
        assert_eq!(s.agent_counts["beta"], 1);
    }

    #[test]
    fn run_metrics_serde_roundtrip() {
        let m = sample_metrics("serde_test", 999, 2);
        let json = serde_json::to_string(&m).unwrap();
        let m2: RunMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(m, m2);
    }

    #[test]
    fn concurrent_recording() {
        let c = MetricsCollector::new();
        let mut handles = vec![];
        for i in 0..10 {
            let cc = c.clone();
            handles.push(thread::spawn(move || {
                cc.record(sample_metrics("thread", i * 10, 0));
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.len(), 10);
    }

    #[test]
    fn json_exporter_valid_output() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("mock", 100, 0));
        let s = c.summary();
        let exporter = JsonExporter;
        let json = exporter.export(&s).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["count"], 1);
    }

    #[test]
    fn json_exporter_agent_counts_deterministic() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("zebra", 10, 0));
        c.record(sample_metrics("alpha", 20, 0));
        let s = c.summary();
        let exporter = JsonExporter;
        let json = exporter.export(&s).unwrap();
        let keys_start = json.find("\"alpha\"").unwrap();
        let keys_end = json.find("\"zebra\"").unwrap();
        assert!(keys_start < keys_end);
    }

    #[test]
    fn percentile_empty() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn percentile_single() {
        assert_eq!(percentile(&[42], 99.0), 42.0);
    }

    #[test]
    fn prometheus_exporter_includes_counts_and_labels() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("acme/Agent/bot", 100, 1));
        let s = c.summary();
        let text = PrometheusExporter.export(&s).unwrap();
        assert!(text.contains("agentspec_runs_total 1"));
        assert!(text.contains("agentspec_agent_runs_total{agent_fqn=\"acme/Agent/bot\"} 1"));
        assert!(text.contains("# TYPE agentspec_runs_total gauge"));
    }

    #[test]
    fn prometheus_exporter_escapes_label_values() {
        let c = MetricsCollector::new();
        c.record(sample_metrics("weird\"name", 10, 0));
        let s = c.summary();
        let text = PrometheusExporter.export(&s).unwrap();
        assert!(text.contains("agent_fqn=\"weird\\\"name\""));
    }
}
