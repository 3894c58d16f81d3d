// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Adapter` contract: what a deployment target implements so the
//! `Planner`/`Applier` pair can validate, apply, export, inspect, and tear
//! down resources against it.

use crate::action::{Action, ActionType};
use agentspec_core::Resource;
use agentspec_runtime::cancel::CancellationToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// The outcome of applying (or destroying) a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The action completed successfully.
    Success,
    /// The action failed; see [`ApplyResult::error`].
    Failed,
    /// The action was never attempted because a prerequisite failed.
    Skipped,
}

/// The result of carrying out one [`Action`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    /// The resource's fully-qualified name.
    pub fqn: String,
    /// What kind of action this was.
    pub action_type: ActionType,
    /// How it went.
    pub status: ApplyOutcome,
    /// An adapter-defined artifact reference (e.g. a deployed URL or id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// The failure message, present iff `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApplyResult {
    /// Build a successful result, optionally carrying an artifact reference.
    #[must_use]
    pub fn success(fqn: impl Into<String>, action_type: ActionType, artifact: Option<String>) -> Self {
        ApplyResult { fqn: fqn.into(), action_type, status: ApplyOutcome::Success, artifact, error: None }
    }

    /// Build a failed result carrying the failure message.
    #[must_use]
    pub fn failed(fqn: impl Into<String>, action_type: ActionType, error: impl Into<String>) -> Self {
        ApplyResult { fqn: fqn.into(), action_type, status: ApplyOutcome::Failed, artifact: None, error: Some(error.into()) }
    }

    /// Build a skipped result: a prerequisite of this action failed.
    #[must_use]
    pub fn skipped(fqn: impl Into<String>, action_type: ActionType, reason: impl Into<String>) -> Self {
        ApplyResult { fqn: fqn.into(), action_type, status: ApplyOutcome::Skipped, artifact: None, error: Some(reason.into()) }
    }
}

/// A resource's observed state on a deployment target, as reported by
/// [`Adapter::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// The resource's fully-qualified name.
    pub fqn: String,
    /// Free-form status text (e.g. `"running"`, `"stopped"`, `"unknown"`).
    pub state: String,
    /// The hash the target currently believes it has applied, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Options controlling [`Adapter::logs`].
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Only return logs for this resource FQN; `None` means all resources.
    pub fqn: Option<String>,
    /// Only return the last `tail` lines, if set.
    pub tail: Option<usize>,
    /// Keep streaming new lines after the initial read.
    pub follow: bool,
}

/// What a deployment target must implement: validation, apply, export,
/// status inspection, log streaming, and teardown. Every long-running
/// method accepts a [`CancellationToken`] and must stop promptly once it
/// fires.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The adapter's stable identifier (matches `deploy_targets[].target`).
    fn name(&self) -> &str;

    /// Reject the resource set up front if this target cannot represent it
    /// (e.g. an unsupported kind, a missing required attribute).
    async fn validate(&self, cancel: &CancellationToken, resources: &[Resource]) -> Result<(), AdapterError>;

    /// Carry out one action. Failure is returned as data (an
    /// [`ApplyOutcome::Failed`] result), not as `Err` — only a condition
    /// that makes the adapter itself unusable (lost connection, auth
    /// failure) is an `Err`.
    async fn apply(&self, cancel: &CancellationToken, action: &Action) -> Result<ApplyResult, AdapterError>;

    /// Write out-of-band artifacts for `resources` (e.g. rendered configs)
    /// into `out_dir`, without applying anything.
    async fn export(&self, cancel: &CancellationToken, resources: &[Resource], out_dir: &Path) -> Result<(), AdapterError>;

    /// Report the target's current view of every resource it knows about.
    async fn status(&self, cancel: &CancellationToken) -> Result<Vec<ResourceStatus>, AdapterError>;

    /// Stream logs into `writer` per `opts`.
    async fn logs(&self, cancel: &CancellationToken, writer: &mut (dyn Write + Send), opts: &LogOptions) -> Result<(), AdapterError>;

    /// Tear down every resource this target knows about.
    async fn destroy(&self, cancel: &CancellationToken) -> Result<Vec<ApplyResult>, AdapterError>;
}

/// Failures an [`Adapter`] implementation itself cannot recover from
/// (distinct from a per-action apply failure, which is carried as data in
/// [`ApplyResult`]).
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// `validate` rejected the resource set.
    #[error("adapter {adapter} rejected resource set: {message}")]
    ValidationFailed {
        /// The adapter's name.
        adapter: String,
        /// Why validation failed.
        message: String,
    },
    /// The operation was cancelled before completing.
    #[error("adapter operation cancelled")]
    Cancelled,
    /// An I/O failure (export, log writing).
    #[error("adapter I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// An unclassified adapter-internal failure.
    #[error("adapter error: {0}")]
    Internal(String),
}
