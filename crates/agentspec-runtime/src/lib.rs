// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-cutting runtime primitives shared by the agentic loop, the
//! desired-state applier, and the pipeline executor: budgets, cancellation,
//! event distribution, lifecycle hooks, invocation receipts, and retry.
//!
//! This crate holds no orchestration logic of its own — it is the toolbox
//! `agentspec-agent`'s turn loop and `agentspec-pipeline`'s step executor
//! both build on, so that budget/cancel/retry/event semantics stay
//! identical across every place an invocation can run.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Budget enforcement for agentic-loop runs.
pub mod budget;
/// Broadcast-based event bus for decoupled event distribution.
pub mod bus;
/// Cancellation primitives for in-flight invocation execution.
pub mod cancel;
/// The streaming event taxonomy and terminal outcome of an invocation.
pub mod event;
/// Lifecycle hooks for runtime extensibility.
pub mod hooks;
/// The invocation request and its persisted receipt.
pub mod invocation;
/// Event multiplexing and routing for broadcasting runtime events.
pub mod multiplex;
/// Observability primitives: tracing spans and runtime observer.
pub mod observe;
/// Pre-processing pipeline applied to an invocation before execution.
pub mod prep;
/// Retry policies and timeout configuration for resilient execution.
pub mod retry;
/// Additional built-in prep stages, builder, and execution helpers.
pub mod stages;
/// Invocation receipt persistence and retrieval.
pub mod store;
/// Telemetry and metrics collection.
pub mod telemetry;

use thiserror::Error;

/// Errors raised while driving an invocation through the runtime layer
/// (budget enforcement, cancellation, policy, or the prep pipeline).
///
/// This is distinct from any error the agentic loop itself produces while
/// talking to a model or tool — those live in `agentspec-agent`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The invocation was cancelled before or during execution.
    #[error("invocation cancelled: {reason}")]
    Cancelled {
        /// Human-readable reason, from [`cancel::CancellationReason::description`].
        reason: &'static str,
    },

    /// A budget dimension (tokens, cost, turns, duration) was exceeded.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(#[from] budget::BudgetViolation),

    /// The prep pipeline (validation, policy, audit) rejected the invocation.
    #[error("prep stage `{stage}` rejected invocation: {source}")]
    PrepRejected {
        /// Name of the stage that rejected the invocation.
        stage: String,
        /// The stage's error.
        #[source]
        source: anyhow::Error,
    },

    /// Retry attempts were exhausted or the overall retry timeout elapsed.
    #[error("retry exhausted: {0}")]
    RetryExhausted(String),

    /// An unclassified internal error.
    #[error("internal runtime error")]
    Internal(#[source] anyhow::Error),
}

/// Bundles the per-invocation runtime state an agentic loop or pipeline step
/// needs: budget tracking, cancellation, lifecycle hooks, and metrics.
///
/// Constructing one of these and threading it through a run is the
/// replacement for what used to be a monolithic orchestrator: each
/// concern (budget, cancel, hooks, metrics) is independently testable and
/// independently optional.
pub struct InvocationContext {
    /// Tracks token/cost/turn/duration usage against configured limits.
    pub budget: std::sync::Arc<budget::BudgetTracker>,
    /// Cooperative cancellation handle for this invocation.
    pub cancel: cancel::CancellableRun,
    /// Registered lifecycle hooks (logging, metrics, validation, ...).
    pub hooks: std::sync::Arc<hooks::HookRegistry>,
    /// Shared run-level metrics collector.
    pub metrics: std::sync::Arc<telemetry::RunMetrics>,
}

impl InvocationContext {
    /// Build a new context with the given budget limit and an empty hook
    /// registry, a fresh cancellation token, and a fresh metrics collector.
    #[must_use]
    pub fn new(limit: budget::BudgetLimit) -> Self {
        Self {
            budget: std::sync::Arc::new(budget::BudgetTracker::new(limit)),
            cancel: cancel::CancellableRun::new(cancel::CancellationToken::new()),
            hooks: std::sync::Arc::new(hooks::HookRegistry::new()),
            metrics: std::sync::Arc::new(telemetry::RunMetrics::new()),
        }
    }

    /// Replace the hook registry (builder style).
    #[must_use]
    pub fn with_hooks(mut self, hooks: hooks::HookRegistry) -> Self {
        self.hooks = std::sync::Arc::new(hooks);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_context_starts_uncancelled_and_within_budget() {
        let ctx = InvocationContext::new(budget::BudgetLimit::default());
        assert!(!ctx.cancel.is_cancelled());
        assert_eq!(ctx.budget.check(), budget::BudgetStatus::WithinLimits);
        assert_eq!(ctx.hooks.hook_count(), 0);
    }

    #[test]
    fn with_hooks_replaces_registry() {
        let mut registry = hooks::HookRegistry::new();
        registry.register(Box::new(hooks::ValidationHook));
        let ctx = InvocationContext::new(budget::BudgetLimit::default()).with_hooks(registry);
        assert_eq!(ctx.hooks.hook_count(), 1);
    }

    #[test]
    fn runtime_error_display_includes_cancellation_reason() {
        let err = RuntimeError::Cancelled { reason: cancel::CancellationReason::Timeout.description() };
        assert!(err.to_string().contains("timeout"));
    }
}
