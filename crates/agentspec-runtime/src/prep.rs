// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pre-processing pipeline applied to an [`Invocation`] before it reaches
//! the agentic loop.
//!
//! A [`Prep`] chain runs zero or more [`PrepStage`] implementations in
//! insertion order; any failure short-circuits the remaining stages. This
//! is distinct from `agentspec-pipeline`'s multi-agent DAG executor — this
//! pipeline runs once, inline, for a single invocation (the same role
//! played by the server's middleware chain for raw HTTP requests).

use crate::invocation::Invocation;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// A single processing stage applied to an invocation before execution.
#[async_trait]
pub trait PrepStage: Send + Sync {
    /// Process (and optionally mutate) the invocation.
    ///
    /// Return `Ok(())` to continue to the next stage, or `Err` to
    /// short-circuit the pipeline.
    async fn process(&self, invocation: &mut Invocation) -> Result<()>;

    /// Human-readable name used in tracing/audit output.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Built-in stages
// ---------------------------------------------------------------------------

/// Validates required invocation fields.
///
/// Rejects invocations with an empty `agent_fqn`.
pub struct ValidationStage;

#[async_trait]
impl PrepStage for ValidationStage {
    async fn process(&self, invocation: &mut Invocation) -> Result<()> {
        anyhow::ensure!(!invocation.agent_fqn.trim().is_empty(), "invocation agent_fqn must not be empty");
        Ok(())
    }

    fn name(&self) -> &str {
        "validation"
    }
}

/// Checks an invocation against a compiled [`agentspec_policy::PolicyEngine`].
///
/// Rejects the invocation unless the engine allows the `"invoke"` action on
/// the target agent for the invocation's subject (taken from `session_id`,
/// since subjects are otherwise not tracked on the invocation itself).
pub struct PolicyStage {
    engine: Arc<agentspec_policy::PolicyEngine>,
}

impl PolicyStage {
    /// Create a policy stage backed by the given compiled engine.
    #[must_use]
    pub fn new(engine: Arc<agentspec_policy::PolicyEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl PrepStage for PolicyStage {
    async fn process(&self, invocation: &mut Invocation) -> Result<()> {
        let decision = self.engine.evaluate("invoke", &invocation.agent_fqn, invocation.session_id.as_deref());
        anyhow::ensure!(decision.is_allowed(), "policy denies invoke on `{}`", invocation.agent_fqn);
        Ok(())
    }

    fn name(&self) -> &str {
        "policy"
    }
}

/// Records invocation processing for audit purposes.
///
/// Stores a log of processed invocation ids that can be inspected after
/// pipeline execution.
pub struct AuditStage {
    log: Arc<Mutex<Vec<AuditEntry>>>,
}

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Invocation id.
    pub run_id: uuid::Uuid,
    /// Agent fully-qualified name at the time of processing.
    pub agent_fqn: String,
}

impl AuditStage {
    /// Create a new audit stage with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self { log: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Return a snapshot of the audit log.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.log.lock().await.clone()
    }
}

impl Default for AuditStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrepStage for AuditStage {
    async fn process(&self, invocation: &mut Invocation) -> Result<()> {
        debug!(target: "agentspec.prep", id = %invocation.id, agent = %invocation.agent_fqn, "audit");
        self.log.lock().await.push(AuditEntry { run_id: invocation.id, agent_fqn: invocation.agent_fqn.clone() });
        Ok(())
    }

    fn name(&self) -> &str {
        "audit"
    }
}

// ---------------------------------------------------------------------------
// Prep chain
// ---------------------------------------------------------------------------

/// An ordered chain of [`PrepStage`]s executed sequentially.
///
/// ```
/// use agentspec_runtime::prep::{Prep, ValidationStage, AuditStage};
///
/// let prep = Prep::new()
///     .stage(ValidationStage)
///     .stage(AuditStage::new());
/// ```
pub struct Prep {
    stages: Vec<Box<dyn PrepStage>>,
}

impl Default for Prep {
    fn default() -> Self {
        Self::new()
    }
}

impl Prep {
    /// Create an empty chain with no stages.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage to the chain (builder pattern).
    #[must_use]
    pub fn stage<S: PrepStage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Execute all stages in order against the given invocation.
    ///
    /// Returns `Ok(())` when every stage succeeds, or the first `Err`
    /// encountered (short-circuiting remaining stages).
    pub async fn execute(&self, invocation: &mut Invocation) -> Result<()> {
        for stage in &self.stages {
            debug!(target: "agentspec.prep", stage = %stage.name(), "executing");
            stage.process(invocation).await?;
        }
        Ok(())
    }

    /// Return the number of stages in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Return `true` if the chain contains no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> Invocation {
        Invocation::new("myapp/Agent/a", serde_json::json!({}))
    }

    #[tokio::test]
    async fn empty_invocation_fails_validation() {
        let prep = Prep::new().stage(ValidationStage);
        let mut inv = Invocation::new("", serde_json::json!({}));
        assert!(prep.execute(&mut inv).await.is_err());
    }

    #[tokio::test]
    async fn audit_stage_records_entries() {
        let audit = AuditStage::new();
        let prep = Prep::new().stage(ValidationStage);
        let mut inv = invocation();
        prep.execute(&mut inv).await.unwrap();
        audit.process(&mut inv).await.unwrap();
        assert_eq!(audit.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn policy_stage_denies_without_matching_rule() {
        let engine = Arc::new(agentspec_policy::PolicyEngine::compile(&[]).unwrap());
        let prep = Prep::new().stage(PolicyStage::new(engine));
        let mut inv = invocation();
        assert!(prep.execute(&mut inv).await.is_err());
    }
}
