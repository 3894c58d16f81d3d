// SPDX-License-Identifier: MIT OR Apache-2.0
//! Additional built-in prep stages, builder, and execution helpers.
//!
//! This module provides:
//! - `RateLimitStage` — per-minute throughput limiter
//! - `DeduplicationStage` — duplicate invocation rejection
//! - `LoggingStage` — entry/exit tracing
//! - `MetricsStage` — execution statistics
//! - `PipelineBuilder` / `StagePipeline` — ergonomic pipeline assembly and
//!   per-stage result reporting

use crate::invocation::Invocation;
use crate::prep::PrepStage;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// StageStats
// ---------------------------------------------------------------------------

/// Accumulated execution statistics for a [`MetricsStage`].
#[derive(Debug, Clone, Default)]
pub struct StageStats {
    /// Total number of invocations.
    pub invocations: u64,
    /// Number of successful invocations.
    pub successes: u64,
    /// Number of failed invocations.
    pub failures: u64,
    /// Sum of all invocation durations in milliseconds.
    pub total_duration_ms: u64,
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// Outcome of executing a single stage inside a [`StagePipeline`].
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Name of the stage (from [`PrepStage::name`]).
    pub stage_name: String,
    /// Whether the stage completed without error.
    pub passed: bool,
    /// Wall-clock time spent in this stage (milliseconds).
    pub duration_ms: u64,
    /// Optional human-readable message (error text on failure).
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// RateLimitStage
// ---------------------------------------------------------------------------

/// Limits how many invocations may be processed per minute.
///
/// Each call to [`process`](PrepStage::process) records a timestamp; if
/// the number of timestamps within the last 60 seconds exceeds
/// `max_per_minute`, the stage returns an error.
pub struct RateLimitStage {
    max_per_minute: u32,
    timestamps: Arc<Mutex<Vec<Instant>>>,
}

impl RateLimitStage {
    /// Create a new rate limiter allowing `max_per_minute` runs per 60-second window.
    #[must_use]
    pub fn new(max_per_minute: u32) -> Self {
        Self { max_per_minute, timestamps: Arc::new(Mutex::new(Vec::new())) }
    }
}

#[async_trait]
impl PrepStage for RateLimitStage {
    async fn process(&self, _invocation: &mut Invocation) -> Result<()> {
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let mut ts = self.timestamps.lock().await;
        ts.retain(|t| now.duration_since(*t) < window);
        if ts.len() as u32 >= self.max_per_minute {
            anyhow::bail!("rate limit exceeded: {} runs in the last 60 s (max {})", ts.len(), self.max_per_minute);
        }
        ts.push(now);
        Ok(())
    }

    fn name(&self) -> &str {
        "rate_limit"
    }
}

// ---------------------------------------------------------------------------
// DeduplicationStage
// ---------------------------------------------------------------------------

/// Prevents duplicate invocations from executing within a configurable window.
///
/// Duplicates are detected by hashing the agent fqn and input of the
/// invocation. If the same hash appears within `window`, the stage rejects
/// the invocation.
pub struct DeduplicationStage {
    window: Duration,
    seen: Arc<Mutex<HashMap<String, Instant>>>,
}

impl DeduplicationStage {
    /// Create a new deduplication stage with the given time window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, seen: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Derive a deduplication key from an invocation.
    ///
    /// Uses the agent fqn and canonical JSON serialization of the input so
    /// that structurally identical invocations (possibly with different
    /// `id`s) are still detected.
    fn dedup_key(invocation: &Invocation) -> String {
        format!("{}:{}", invocation.agent_fqn, serde_json::to_string(&invocation.input).unwrap_or_default())
    }
}

#[async_trait]
impl PrepStage for DeduplicationStage {
    async fn process(&self, invocation: &mut Invocation) -> Result<()> {
        let key = Self::dedup_key(invocation);
        let now = Instant::now();
        let mut seen = self.seen.lock().await;
        seen.retain(|_, ts| now.duration_since(*ts) < self.window);
        if seen.contains_key(&key) {
            anyhow::bail!("duplicate invocation detected within deduplication window");
        }
        seen.insert(key, now);
        Ok(())
    }

    fn name(&self) -> &str {
        "deduplication"
    }
}

// ---------------------------------------------------------------------------
// LoggingStage
// ---------------------------------------------------------------------------

/// Logs invocation entry with a configurable prefix.
///
/// Records the invocation `id` and `agent_fqn` at `info` level before
/// passing through.
pub struct LoggingStage {
    prefix: String,
}

impl LoggingStage {
    /// Create a new logging stage with the given log-line prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.to_string() }
    }
}

#[async_trait]
impl PrepStage for LoggingStage {
    async fn process(&self, invocation: &mut Invocation) -> Result<()> {
        info!(
            target: "agentspec.prep",
            prefix = %self.prefix,
            id = %invocation.id,
            agent = %invocation.agent_fqn,
            "{}: processing invocation id={} agent={}",
            self.prefix,
            invocation.id,
            invocation.agent_fqn,
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

// ---------------------------------------------------------------------------
// MetricsStage
// ---------------------------------------------------------------------------

/// Tracks execution metrics (timing, counts, outcomes).
///
/// Because this stage only measures its own `process` call it must wrap
/// another stage to be useful — or, more commonly, it is placed in a
/// [`StagePipeline`] where each stage is timed externally. On its own the
/// stage always succeeds and records a success.
pub struct MetricsStage {
    stats: Arc<Mutex<StageStats>>,
}

impl MetricsStage {
    /// Create a new metrics stage with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self { stats: Arc::new(Mutex::new(StageStats::default())) }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> StageStats {
        self.stats.lock().await.clone()
    }

    /// Record an external observation (used by [`StagePipeline`]).
    pub(crate) async fn record(&self, duration_ms: u64, success: bool) {
        let mut s = self.stats.lock().await;
        s.invocations += 1;
        s.total_duration_ms += duration_ms;
        if success {
            s.successes += 1;
        } else {
            s.failures += 1;
        }
    }
}

impl Default for MetricsStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrepStage for MetricsStage {
    async fn process(&self, _invocation: &mut Invocation) -> Result<()> {
        let start = Instant::now();
        let duration_ms = start.elapsed().as_millis() as u64;
        self.record(duration_ms, true).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "metrics"
    }
}

// ---------------------------------------------------------------------------
// PipelineBuilder / StagePipeline
// ---------------------------------------------------------------------------

/// Ergonomic builder for a [`StagePipeline`].
///
/// ```
/// use agentspec_runtime::stages::PipelineBuilder;
/// use agentspec_runtime::prep::ValidationStage;
///
/// let pipeline = PipelineBuilder::new()
///     .add_stage(Box::new(ValidationStage))
///     .build();
/// assert_eq!(pipeline.stage_names().len(), 1);
/// ```
pub struct PipelineBuilder {
    stages: Vec<Box<dyn PrepStage>>,
}

impl PipelineBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a boxed stage to the pipeline.
    #[must_use]
    pub fn add_stage(mut self, stage: Box<dyn PrepStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Return the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Consume the builder and produce a [`StagePipeline`].
    #[must_use]
    pub fn build(self) -> StagePipeline {
        StagePipeline { stages: self.stages }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An ordered chain of [`PrepStage`]s that reports per-stage results.
///
/// Unlike [`Prep`](crate::prep::Prep), `StagePipeline` records a
/// [`StageResult`] for every stage (including timing) and does **not**
/// short-circuit on failure — all stages run unconditionally so that
/// callers receive a complete diagnostic picture.
pub struct StagePipeline {
    stages: Vec<Box<dyn PrepStage>>,
}

impl StagePipeline {
    /// Execute all stages against the given invocation, returning a result
    /// vector with one entry per stage.
    pub async fn execute(&self, invocation: &mut Invocation) -> Vec<StageResult> {
        let mut results = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let start = Instant::now();
            let outcome = stage.process(invocation).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            let (passed, message) = match outcome {
                Ok(()) => (true, None),
                Err(e) => (false, Some(e.to_string())),
            };
            debug!(target: "agentspec.prep", stage = %stage.name(), passed, duration_ms, "stage result");
            results.push(StageResult { stage_name: stage.name().to_string(), passed, duration_ms, message });
        }
        results
    }

    /// Return the names of all stages in insertion order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prep::ValidationStage;

    fn invocation() -> Invocation {
        Invocation::new("myapp/Agent/a", serde_json::json!({}))
    }

    #[tokio::test]
    async fn rate_limit_stage_rejects_after_threshold() {
        let stage = RateLimitStage::new(1);
        let mut inv = invocation();
        assert!(stage.process(&mut inv).await.is_ok());
        assert!(stage.process(&mut inv).await.is_err());
    }

    #[tokio::test]
    async fn deduplication_stage_rejects_repeat_invocations() {
        let stage = DeduplicationStage::new(Duration::from_secs(60));
        let mut inv = invocation();
        assert!(stage.process(&mut inv).await.is_ok());
        assert!(stage.process(&mut inv).await.is_err());
    }

    #[tokio::test]
    async fn stage_pipeline_runs_every_stage_even_on_failure() {
        let pipeline = PipelineBuilder::new()
            .add_stage(Box::new(ValidationStage))
            .add_stage(Box::new(LoggingStage::new("test")))
            .build();
        let mut inv = Invocation::new("", serde_json::json!({}));
        let results = pipeline.execute(&mut inv).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].passed);
        assert!(results[1].passed);
    }
}
