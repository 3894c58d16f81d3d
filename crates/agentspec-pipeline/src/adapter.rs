// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wraps [`agentspec_agent::AgentRuntime`] as an [`AgentInvoker`], so the
//! executor reuses the runtime's retry/fallback policy and session
//! bookkeeping rather than re-implementing invocation logic.

use crate::executor::AgentInvoker;
use agentspec_agent::AgentRuntime;
use agentspec_runtime::invocation::Invocation;
use async_trait::async_trait;

/// Adapts a live [`AgentRuntime`] to the executor's [`AgentInvoker`] seam.
pub struct RuntimeInvoker<'a> {
    runtime: &'a AgentRuntime,
}

impl<'a> RuntimeInvoker<'a> {
    /// Wrap `runtime` for use as a pipeline step invoker.
    #[must_use]
    pub fn new(runtime: &'a AgentRuntime) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl<'a> AgentInvoker for RuntimeInvoker<'a> {
    async fn invoke(&self, agent_fqn: &str, input: serde_json::Value) -> Result<String, String> {
        let invocation = Invocation::new(agent_fqn, input);
        self.runtime.invoke(invocation).await.map(|outcome| outcome.output).map_err(|e| e.to_string())
    }
}
