// SPDX-License-Identifier: MIT OR Apache-2.0
//! The agent dispatcher: picks ReAct or `on_input` per agent, enforces the
//! `on_error` recovery policy, and wires skill/delegate calls back through
//! the tool registry and the runtime itself.

use crate::llm::{LlmClient, LlmError};
use crate::on_input::{self, ActivityEntry, Delegator, OnInputError, SkillInvoker};
use crate::project::{OnError, ProjectedRuntime, ResolvedAgent};
use crate::react::{self, LoopDeps, LoopStatus, ReactInput, ToolCallRecord};
use agentspec_runtime::bus::EventBus;
use agentspec_runtime::budget::{BudgetLimit, BudgetTracker};
use agentspec_runtime::cancel::CancellationToken;
use agentspec_runtime::event::{Outcome, RuntimeEvent};
use agentspec_runtime::invocation::{Invocation, InvocationReceipt};
use agentspec_runtime::retry::{retry_async, RetryError, RetryPolicyBuilder};
use agentspec_session::{Message, Role, SessionError, SessionStore};
use agentspec_tools::{ToolContext, ToolRegistry};
use std::sync::Arc;
use std::time::Instant;

/// Failures dispatching an invocation. Every variant reports a condition
/// that prevented the loop from producing any outcome at all — a loop that
/// ran and reached `cancelled`/`turn_limit_reached`/`token_budget_exceeded`
/// is still `Ok`, just with that status recorded in [`InvocationOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// The named agent has no projection in this runtime.
    #[error("agent {0:?} is not defined")]
    UnknownAgent(String),
    /// `on_error == fallback` named an agent that isn't defined, or no
    /// fallback was configured at all.
    #[error("fallback agent {0:?} is not defined")]
    UnknownFallback(String),
    /// Every retry/fallback attempt exhausted itself against the model;
    /// surfaced to the caller when `on_error == abort`.
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// The `on_input` program failed (a skill or delegate call failed).
    #[error(transparent)]
    OnInput(#[from] OnInputError),
    /// The session store rejected a read or write.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Everything one invocation attempt produced.
#[derive(Debug, Clone)]
struct RunOutcome {
    output: String,
    tool_calls: Vec<ToolCallRecord>,
    trace: Vec<ActivityEntry>,
    turns: u32,
    input_tokens: u64,
    output_tokens: u64,
    outcome: Outcome,
}

/// Everything one invocation produced, returned to the caller.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    /// The tamper-evident receipt for this run.
    pub receipt: InvocationReceipt,
    /// The final (possibly partial) output text.
    pub output: String,
    /// Tool calls made during a ReAct attempt (empty for `on_input` agents).
    pub tool_calls: Vec<ToolCallRecord>,
    /// The `on_input` activity trace (empty for ReAct agents).
    pub trace: Vec<ActivityEntry>,
    /// Prompt tokens consumed (0 for `on_input` agents, which never call the model directly).
    pub input_tokens: u64,
    /// Completion tokens consumed (0 for `on_input` agents).
    pub output_tokens: u64,
}

/// Owns the projected runtime view plus the shared services (tool registry,
/// session store, model backend, event bus) every invocation runs against.
///
/// Holds one set of shared backends and routes each incoming invocation to
/// the right one rather than constructing fresh state per call.
pub struct AgentRuntime {
    projected: ProjectedRuntime,
    tools: ToolRegistry,
    tool_ctx: ToolContext,
    sessions: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmClient>,
    events: Option<Arc<EventBus>>,
}

impl AgentRuntime {
    /// Build a runtime over an already-projected document and its shared
    /// backends.
    #[must_use]
    pub fn new(
        projected: ProjectedRuntime,
        tools: ToolRegistry,
        tool_ctx: ToolContext,
        sessions: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmClient>,
        events: Option<Arc<EventBus>>,
    ) -> Self {
        Self { projected, tools, tool_ctx, sessions, llm, events }
    }

    /// The underlying projection, for inspection (e.g. listing agents over
    /// the HTTP API).
    #[must_use]
    pub fn projected(&self) -> &ProjectedRuntime {
        &self.projected
    }

    /// The shared event bus, if one was configured. A streaming transport
    /// (HTTP SSE, a CLI `--events` sink) subscribes to this *before*
    /// calling [`invoke`](Self::invoke) to avoid missing early events —
    /// the bus is one broadcast channel per runtime, not one per
    /// invocation, so a subscriber sees every concurrent run's events.
    #[must_use]
    pub fn events(&self) -> Option<&Arc<EventBus>> {
        self.events.as_ref()
    }

    fn resolve(&self, fqn: &str) -> Result<&ResolvedAgent, InvokeError> {
        self.projected.agents.get(fqn).ok_or_else(|| InvokeError::UnknownAgent(fqn.to_string()))
    }

    /// Run one invocation to completion, applying the target agent's
    /// `on_error` policy and emitting exactly one terminal event.
    pub async fn invoke(&self, invocation: Invocation) -> Result<InvocationOutcome, InvokeError> {
        let started = Instant::now();
        let agent = self.resolve(&invocation.agent_fqn)?;
        let input_text =
            invocation.input.as_str().map(str::to_string).unwrap_or_else(|| invocation.input.to_string());

        match self.invoke_with_policy(agent, &invocation.session_id, &input_text).await {
            Ok(run) => {
                if let Some(bus) = &self.events {
                    bus.publish(RuntimeEvent::Done { outcome: run.outcome });
                }
                let receipt = InvocationReceipt::new(
                    invocation.id,
                    invocation.agent_fqn.clone(),
                    run.outcome,
                    run.turns,
                    run.input_tokens + run.output_tokens,
                    0.0,
                    started.elapsed().as_millis() as u64,
                    chrono::Utc::now(),
                );
                Ok(InvocationOutcome {
                    receipt,
                    output: run.output,
                    tool_calls: run.tool_calls,
                    trace: run.trace,
                    input_tokens: run.input_tokens,
                    output_tokens: run.output_tokens,
                })
            }
            Err(InvokeError::Llm(e)) => {
                if let Some(bus) = &self.events {
                    bus.publish(RuntimeEvent::Error { message: e.to_string() });
                }
                Err(InvokeError::Llm(e))
            }
            Err(e) => Err(e),
        }
    }

    async fn invoke_with_policy(
        &self,
        agent: &ResolvedAgent,
        session_id: &Option<String>,
        input_text: &str,
    ) -> Result<RunOutcome, InvokeError> {
        let policy = RetryPolicyBuilder::new().max_retries(agent.max_retries).build();
        let attempt = || async { self.run_once(agent, session_id, input_text).await };

        match agent.on_error {
            OnError::Abort => attempt().await,
            OnError::Retry => match retry_async(&policy, attempt, is_retryable).await {
                Ok(outcome) => Ok(outcome.value),
                Err(RetryError::Operation(e)) => Err(e),
                Err(RetryError::TimedOut(d)) => {
                    Err(InvokeError::Llm(LlmError::Transport(format!("retry timed out after {d:?}"))))
                }
            },
            OnError::Fallback => match attempt().await {
                Err(InvokeError::Llm(_)) => {
                    let fallback_fqn =
                        agent.fallback.clone().ok_or_else(|| InvokeError::UnknownFallback("<unset>".into()))?;
                    let fallback_agent = self.resolve(&fallback_fqn)?;
                    self.run_once(fallback_agent, session_id, input_text).await
                }
                other => other,
            },
        }
    }

    async fn run_once(
        &self,
        agent: &ResolvedAgent,
        session_id: &Option<String>,
        input_text: &str,
    ) -> Result<RunOutcome, InvokeError> {
        if let Some(statements) = &agent.on_input {
            let outcome = on_input::run(statements, input_text, self, self).await?;
            if let Some(session_id) = session_id {
                self.sessions.append(session_id, Message::new(Role::User, input_text)).await?;
                self.sessions.append(session_id, Message::new(Role::Assistant, outcome.output.clone())).await?;
            }
            return Ok(RunOutcome {
                output: outcome.output,
                tool_calls: Vec::new(),
                trace: outcome.trace,
                turns: 0,
                input_tokens: 0,
                output_tokens: 0,
                outcome: Outcome::Success,
            });
        }

        let history = match session_id {
            Some(id) => match self.sessions.load(id).await? {
                Some(session) => session.view(),
                None => {
                    self.sessions.create(&agent.fqn, agent.memory.clone()).await?;
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let budget = BudgetTracker::new(BudgetLimit {
            max_tokens: agent.token_budget,
            max_duration: agent.timeout,
            ..BudgetLimit::default()
        });
        budget.start_timer();
        let cancel = CancellationToken::new();

        let deps =
            LoopDeps { llm: self.llm.as_ref(), tools: &self.tools, tool_ctx: &self.tool_ctx, events: self.events.as_deref() };
        let input = ReactInput { message: input_text.to_string(), variables: Default::default(), history };

        let result = react::run(agent, input, deps, &budget, &cancel).await?;

        if let Some(id) = session_id {
            if !matches!(result.status, LoopStatus::Cancelled) {
                for message in &result.new_messages {
                    self.sessions.append(id, message.clone()).await?;
                }
            }
        }

        Ok(RunOutcome {
            output: result.output,
            tool_calls: result.tool_calls,
            trace: Vec::new(),
            turns: result.turns,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            outcome: result.status.to_outcome(),
        })
    }
}

fn is_retryable(e: &InvokeError) -> bool {
    matches!(e, InvokeError::Llm(_))
}

#[async_trait::async_trait]
impl SkillInvoker for AgentRuntime {
    async fn invoke_skill(&self, skill: &str, params: serde_json::Value) -> Result<String, String> {
        self.tools.execute(&self.tool_ctx, skill, params).await.map_err(|e| e.to_string())
    }
}

#[async_trait::async_trait]
impl Delegator for AgentRuntime {
    async fn delegate(&self, agent_fqn: &str, input: &str) -> Result<String, String> {
        let agent = self.resolve(agent_fqn).map_err(|e| e.to_string())?;
        let run = self.run_once(agent, &None, input).await.map_err(|e| e.to_string())?;
        Ok(run.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, StubLlmClient};
    use crate::project::ResolvedAgent;
    use agentspec_session::{InMemorySessionStore, MemoryStrategy, TruncatingSummarizer};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn react_agent(name: &str) -> ResolvedAgent {
        ResolvedAgent {
            fqn: format!("pkg/Agent/{name}"),
            name: name.to_string(),
            model: "stub".into(),
            system_prompt: "be helpful".into(),
            skills: vec![],
            strategy: "react".into(),
            max_turns: 3,
            timeout: None,
            token_budget: None,
            temperature: None,
            stream: false,
            on_error: OnError::Abort,
            max_retries: 0,
            fallback: None,
            memory: MemoryStrategy::default(),
            delegates: vec![],
            on_input: None,
            config_params: vec![],
        }
    }

    fn runtime_with(agents: Vec<ResolvedAgent>, llm: StubLlmClient) -> AgentRuntime {
        let mut map = BTreeMap::new();
        for agent in agents {
            map.insert(agent.fqn.clone(), agent);
        }
        let projected =
            ProjectedRuntime { prompts: BTreeMap::new(), agents: map, skills: vec![], mcp_servers: vec![], pipelines: vec![] };
        let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(60), Arc::new(TruncatingSummarizer::default())));
        AgentRuntime::new(projected, ToolRegistry::new(), ToolContext::default(), sessions, Arc::new(llm), None)
    }

    #[tokio::test]
    async fn successful_invocation_produces_a_valid_receipt() {
        let llm = StubLlmClient::new(vec![Ok(LlmResponse { text: "hi there".into(), ..Default::default() })]);
        let runtime = runtime_with(vec![react_agent("a")], llm);
        let invocation = Invocation::new("pkg/Agent/a", serde_json::json!("hello"));

        let outcome = runtime.invoke(invocation).await.unwrap();
        assert_eq!(outcome.output, "hi there");
        assert!(outcome.receipt.is_hash_valid());
        assert_eq!(outcome.receipt.outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn unknown_agent_is_rejected_before_any_model_call() {
        let llm = StubLlmClient::new(vec![]);
        let runtime = runtime_with(vec![], llm);
        let invocation = Invocation::new("pkg/Agent/missing", serde_json::json!("hello"));

        let err = runtime.invoke(invocation).await.unwrap_err();
        assert!(matches!(err, InvokeError::UnknownAgent(_)));
    }

    #[tokio::test]
    async fn fallback_policy_reruns_against_the_fallback_agent_on_transport_failure() {
        let mut primary = react_agent("primary");
        primary.on_error = OnError::Fallback;
        primary.fallback = Some("pkg/Agent/backup".into());
        let backup = react_agent("backup");

        let llm = StubLlmClient::new(vec![
            Err(LlmError::Transport("down".into())),
            Ok(LlmResponse { text: "recovered".into(), ..Default::default() }),
        ]);
        let runtime = runtime_with(vec![primary, backup], llm);
        let invocation = Invocation::new("pkg/Agent/primary", serde_json::json!("hello"));

        let outcome = runtime.invoke(invocation).await.unwrap();
        assert_eq!(outcome.output, "recovered");
    }

    #[tokio::test]
    async fn abort_policy_surfaces_the_transport_error() {
        let llm = StubLlmClient::new(vec![Err(LlmError::Transport("down".into()))]);
        let runtime = runtime_with(vec![react_agent("a")], llm);
        let invocation = Invocation::new("pkg/Agent/a", serde_json::json!("hello"));

        let err = runtime.invoke(invocation).await.unwrap_err();
        assert!(matches!(err, InvokeError::Llm(_)));
    }
}
