// SPDX-License-Identifier: MIT OR Apache-2.0
//! The unit of work the runtime executes: one call into a deployed agent.

use crate::event::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single request to run an agent's turn loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique identifier for this run.
    pub id: Uuid,
    /// Fully-qualified name of the agent being invoked.
    pub agent_fqn: String,
    /// Session this invocation belongs to, if any (carries prior turn history).
    pub session_id: Option<String>,
    /// The input payload (user message, structured input, etc).
    pub input: serde_json::Value,
}

impl Invocation {
    /// Start a new invocation against `agent_fqn` with the given input.
    #[must_use]
    pub fn new(agent_fqn: impl Into<String>, input: serde_json::Value) -> Self {
        Self { id: Uuid::new_v4(), agent_fqn: agent_fqn.into(), session_id: None, input }
    }

    /// Attach a session id (builder style).
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// The persisted record of a completed invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationReceipt {
    /// The invocation this receipt reports on.
    pub run_id: Uuid,
    /// Fully-qualified name of the agent that ran.
    pub agent_fqn: String,
    /// How the run ended.
    pub outcome: Outcome,
    /// Number of agentic turns consumed.
    pub turns_used: u32,
    /// Number of tokens consumed (prompt + completion).
    pub tokens_used: u64,
    /// Estimated cost in USD.
    pub cost_usd: f64,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Content hash of `(run_id, agent_fqn, outcome, finished_at)`, used to
    /// detect tampering in the on-disk store.
    pub receipt_sha256: String,
}

impl InvocationReceipt {
    /// Build a receipt, computing its content hash.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        agent_fqn: impl Into<String>,
        outcome: Outcome,
        turns_used: u32,
        tokens_used: u64,
        cost_usd: f64,
        duration_ms: u64,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let agent_fqn = agent_fqn.into();
        let fingerprint = format!("{run_id}:{agent_fqn}:{outcome:?}:{}", finished_at.to_rfc3339());
        let receipt_sha256 = agentspec_core::sha256_hex(fingerprint.as_bytes());
        Self { run_id, agent_fqn, outcome, turns_used, tokens_used, cost_usd, duration_ms, finished_at, receipt_sha256 }
    }

    /// Recompute and compare the content hash against the stored one.
    #[must_use]
    pub fn is_hash_valid(&self) -> bool {
        let fingerprint =
            format!("{}:{}:{:?}:{}", self.run_id, self.agent_fqn, self.outcome, self.finished_at.to_rfc3339());
        agentspec_core::sha256_hex(fingerprint.as_bytes()) == self.receipt_sha256
    }
}
