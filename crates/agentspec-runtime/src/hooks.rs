// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle hooks for runtime extensibility.
//!
//! Register [`LifecycleHook`] implementations with a [`HookRegistry`] to
//! observe and react to an invocation's lifecycle (start, event, complete,
//! error) without modifying the agentic loop itself.

use crate::RuntimeError;
use crate::event::RuntimeEvent;
use crate::invocation::{Invocation, InvocationReceipt};
use crate::telemetry::RunMetrics;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Extension point called at well-defined moments in an invocation's lifecycle.
///
/// All methods have default no-op implementations so hooks only need to
/// override the callbacks they care about.
pub trait LifecycleHook {
    /// Called before the agentic loop begins.
    ///
    /// # Errors
    ///
    /// Returning an error signals that the hook considers the run invalid;
    /// the registry collects all such results for the caller to inspect.
    fn on_run_start(&self, _invocation: &Invocation) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// Called for every [`RuntimeEvent`] emitted during the run.
    ///
    /// # Errors
    ///
    /// An error here is informational — the runtime does not abort the run.
    fn on_event(&self, _event: &RuntimeEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// Called once the run has produced an [`InvocationReceipt`].
    ///
    /// # Errors
    ///
    /// An error here is informational.
    fn on_run_complete(&self, _receipt: &InvocationReceipt) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// Called when the runtime encounters a [`RuntimeError`].
    fn on_error(&self, _error: &RuntimeError) {}

    /// Human-readable name for this hook (used in logging / diagnostics).
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered collection of [`LifecycleHook`]s that fires them in registration order.
pub struct HookRegistry {
    hooks: Vec<Box<dyn LifecycleHook + Send + Sync>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook. Hooks fire in the order they are registered.
    pub fn register(&mut self, hook: Box<dyn LifecycleHook + Send + Sync>) {
        self.hooks.push(hook);
    }

    /// Fire [`LifecycleHook::on_run_start`] on every registered hook.
    pub fn fire_run_start(&self, inv: &Invocation) -> Vec<Result<(), Box<dyn std::error::Error + Send + Sync>>> {
        self.hooks.iter().map(|h| h.on_run_start(inv)).collect()
    }

    /// Fire [`LifecycleHook::on_event`] on every registered hook.
    pub fn fire_event(&self, event: &RuntimeEvent) -> Vec<Result<(), Box<dyn std::error::Error + Send + Sync>>> {
        self.hooks.iter().map(|h| h.on_event(event)).collect()
    }

    /// Fire [`LifecycleHook::on_run_complete`] on every registered hook.
    pub fn fire_run_complete(
        &self,
        receipt: &InvocationReceipt,
    ) -> Vec<Result<(), Box<dyn std::error::Error + Send + Sync>>> {
        self.hooks.iter().map(|h| h.on_run_complete(receipt)).collect()
    }

    /// Fire [`LifecycleHook::on_error`] on every registered hook.
    pub fn fire_error(&self, error: &RuntimeError) {
        for h in &self.hooks {
            h.on_error(error);
        }
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Names of all registered hooks, in registration order.
    #[must_use]
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Built-in: LoggingHook
// ---------------------------------------------------------------------------

/// Logs lifecycle transitions via the `tracing` crate.
pub struct LoggingHook;

impl LifecycleHook for LoggingHook {
    fn on_run_start(&self, invocation: &Invocation) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            target: "agentspec.hooks",
            run_id = %invocation.id,
            agent = %invocation.agent_fqn,
            "run starting"
        );
        Ok(())
    }

    fn on_event(&self, event: &RuntimeEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(target: "agentspec.hooks", ?event, "runtime event");
        Ok(())
    }

    fn on_run_complete(&self, receipt: &InvocationReceipt) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            target: "agentspec.hooks",
            run_id = %receipt.run_id,
            outcome = ?receipt.outcome,
            duration_ms = receipt.duration_ms,
            "run complete"
        );
        Ok(())
    }

    fn on_error(&self, error: &RuntimeError) {
        tracing::error!(target: "agentspec.hooks", %error, "runtime error");
    }

    fn name(&self) -> &str {
        "logging"
    }
}

// ---------------------------------------------------------------------------
// Built-in: MetricsHook
// ---------------------------------------------------------------------------

/// Updates a shared [`RunMetrics`] collector on lifecycle events.
pub struct MetricsHook {
    metrics: Arc<RunMetrics>,
}

impl MetricsHook {
    /// Create a new metrics hook backed by the given collector.
    #[must_use]
    pub fn new(metrics: Arc<RunMetrics>) -> Self {
        Self { metrics }
    }

    /// Return a reference to the underlying metrics.
    #[must_use]
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }
}

impl LifecycleHook for MetricsHook {
    fn on_run_complete(&self, receipt: &InvocationReceipt) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.metrics.record_run(receipt.duration_ms, receipt.outcome.is_success(), 0);
        Ok(())
    }

    fn name(&self) -> &str {
        "metrics"
    }
}

// ---------------------------------------------------------------------------
// Built-in: ValidationHook
// ---------------------------------------------------------------------------

/// Validates an [`Invocation`] before the run starts.
///
/// Current checks: `agent_fqn` must not be empty.
pub struct ValidationHook;

impl LifecycleHook for ValidationHook {
    fn on_run_start(&self, invocation: &Invocation) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if invocation.agent_fqn.trim().is_empty() {
            return Err("invocation agent_fqn must not be empty".into());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "validation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Outcome;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn registry_fires_hooks_in_registration_order() {
        let mut reg = HookRegistry::new();
        reg.register(Box::new(ValidationHook));
        reg.register(Box::new(LoggingHook));
        assert_eq!(reg.hook_names(), vec!["validation", "logging"]);
    }

    #[test]
    fn validation_hook_rejects_empty_agent_fqn() {
        let inv = Invocation::new("", serde_json::json!({}));
        let hook = ValidationHook;
        assert!(hook.on_run_start(&inv).is_err());
    }

    #[test]
    fn metrics_hook_records_completed_run() {
        let metrics = Arc::new(RunMetrics::new());
        let hook = MetricsHook::new(Arc::clone(&metrics));
        let receipt = InvocationReceipt::new(Uuid::new_v4(), "myapp/Agent/a", Outcome::Success, 2, 50, 0.0, 10, Utc::now());
        hook.on_run_complete(&receipt).unwrap();
        assert_eq!(metrics.snapshot().total_runs, 1);
    }
}
