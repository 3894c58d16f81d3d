// SPDX-License-Identifier: MIT OR Apache-2.0
//! The ReAct turn loop: turn-based LLM/tool interleaving with budget
//! enforcement and cooperative cancellation.
//!
//! One call to [`run`] is one *attempt* at an invocation. Retrying or
//! falling back across attempts is the caller's concern (`agentspec-agent::
//! runtime`), not this module's — a single attempt here only distinguishes
//! "the model/transport failed" (an `Err`) from the four terminal statuses
//! an attempt can otherwise reach.

use crate::llm::{LlmClient, LlmError, LlmRequest};
use crate::project::ResolvedAgent;
use agentspec_runtime::bus::EventBus;
use agentspec_runtime::budget::{BudgetStatus, BudgetTracker};
use agentspec_runtime::cancel::CancellationToken;
use agentspec_runtime::event::RuntimeEvent;
use agentspec_session::{Message, Role};
use agentspec_tools::{ToolContext, ToolRegistry};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Everything a turn loop needs beyond the agent descriptor itself.
pub struct LoopDeps<'a> {
    /// The model backend to call each turn.
    pub llm: &'a dyn LlmClient,
    /// The tool registry skills resolve against.
    pub tools: &'a ToolRegistry,
    /// Resolved secrets and the shared MCP pool.
    pub tool_ctx: &'a ToolContext,
    /// Where to publish `token`/`tool_call`/`tool_result` events, if the
    /// invocation requested streaming.
    pub events: Option<&'a EventBus>,
}

/// The rendered input to one invocation attempt.
#[derive(Debug, Clone, Default)]
pub struct ReactInput {
    /// The raw user message; `{{k}}` placeholders are substituted from
    /// `variables` before the first LLM call.
    pub message: String,
    /// Variables available for `{{k}}` substitution.
    pub variables: BTreeMap<String, String>,
    /// Prior turn history for this session, if any (a leading `system`
    /// message, if present, is dropped — the agent's own system prompt
    /// always takes that slot).
    pub history: Vec<Message>,
}

/// One row of the per-invocation tool-call audit trail.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    /// The call id the model assigned.
    pub id: String,
    /// The tool name invoked.
    pub tool_name: String,
    /// The arguments passed.
    pub input: serde_json::Value,
    /// The tool's string output, if it succeeded.
    pub output: Option<String>,
    /// The tool's error description, if it failed.
    pub error: Option<String>,
    /// How long the call took.
    pub duration: Duration,
    /// When the call started.
    pub started_at: DateTime<Utc>,
}

/// How one attempt of the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// The model produced a final response with no pending tool calls.
    Completed,
    /// `max_turns` was exhausted before the model stopped calling tools.
    TurnLimitReached,
    /// The invocation's token budget was exceeded.
    TokenBudgetExceeded,
    /// The invocation was cancelled before it could complete.
    Cancelled,
}

impl LoopStatus {
    /// Maps a loop status onto the runtime's terminal [`Outcome`] taxonomy.
    #[must_use]
    pub fn to_outcome(self) -> agentspec_runtime::event::Outcome {
        use agentspec_runtime::event::Outcome;
        match self {
            LoopStatus::Completed | LoopStatus::TurnLimitReached => Outcome::Success,
            LoopStatus::TokenBudgetExceeded => Outcome::BudgetExceeded,
            LoopStatus::Cancelled => Outcome::Cancelled,
        }
    }
}

/// The result of running one attempt of the ReAct loop.
#[derive(Debug, Clone)]
pub struct ReactOutcome {
    /// The final (possibly partial) assistant output.
    pub output: String,
    /// How this attempt ended.
    pub status: LoopStatus,
    /// Number of turns consumed.
    pub turns: u32,
    /// Every tool call made during this attempt, in execution order.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Messages this attempt produced, ready to append to the session
    /// (never includes the rendered user message or system prompt — only
    /// assistant/tool turns). Empty if cancelled before the first turn
    /// completed, so a cancelled attempt never appends partial history.
    pub new_messages: Vec<Message>,
    /// Cumulative prompt tokens consumed.
    pub input_tokens: u64,
    /// Cumulative completion tokens consumed.
    pub output_tokens: u64,
}

fn render_variables(message: &str, variables: &BTreeMap<String, String>) -> String {
    let mut rendered = message.to_string();
    for (key, value) in variables {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

fn emit(events: Option<&EventBus>, event: RuntimeEvent) {
    if let Some(bus) = events {
        bus.publish(event);
    }
}

fn emit_tokens(events: Option<&EventBus>, text: &str) {
    if text.is_empty() {
        return;
    }
    for word in text.split_inclusive(' ') {
        emit(events, RuntimeEvent::Token { text: word.to_string() });
    }
}

/// Run one attempt of the ReAct loop.
///
/// Returns `Err` only for a transport-level model failure (the caller's
/// `on_error` policy decides whether to retry, fall back, or abort); every
/// other terminal condition is represented in [`ReactOutcome::status`].
pub async fn run(
    agent: &ResolvedAgent,
    input: ReactInput,
    deps: LoopDeps<'_>,
    budget: &BudgetTracker,
    cancel: &CancellationToken,
) -> Result<ReactOutcome, LlmError> {
    let rendered_input = render_variables(&input.message, &input.variables);

    let mut prompt = Vec::with_capacity(input.history.len() + 2);
    prompt.push(Message::new(Role::System, agent.system_prompt.clone()));
    prompt.extend(input.history.iter().filter(|m| m.role != Role::System).cloned());
    prompt.push(Message::new(Role::User, rendered_input));

    let mut new_messages = Vec::new();
    let mut tool_calls = Vec::new();
    let mut last_output = String::new();
    let mut input_tokens = 0u64;
    let mut output_tokens = 0u64;

    let tool_defs: Vec<_> = agent
        .skills
        .iter()
        .filter_map(|name| deps.tools.definitions().find(|d| &d.name == name).cloned())
        .collect();

    for turn in 1..=agent.max_turns {
        if cancel.is_cancelled() {
            return Ok(ReactOutcome {
                output: last_output,
                status: LoopStatus::Cancelled,
                turns: turn - 1,
                tool_calls,
                new_messages,
                input_tokens,
                output_tokens,
            });
        }

        let request = LlmRequest {
            model: agent.model.clone(),
            messages: prompt.clone(),
            tools: tool_defs.clone(),
            temperature: agent.temperature,
        };
        let response = deps.llm.complete(request).await?;

        budget.record_tokens(response.input_tokens + response.output_tokens);
        budget.record_turn();
        input_tokens += response.input_tokens;
        output_tokens += response.output_tokens;

        if let BudgetStatus::Exceeded(_) = budget.check() {
            return Ok(ReactOutcome {
                output: last_output,
                status: LoopStatus::TokenBudgetExceeded,
                turns: turn,
                tool_calls,
                new_messages,
                input_tokens,
                output_tokens,
            });
        }

        emit_tokens(deps.events, &response.text);
        last_output = response.text.clone();

        if response.tool_calls.is_empty() {
            new_messages.push(Message::new(Role::Assistant, response.text.clone()));
            return Ok(ReactOutcome {
                output: last_output,
                status: LoopStatus::Completed,
                turns: turn,
                tool_calls,
                new_messages,
                input_tokens,
                output_tokens,
            });
        }

        new_messages.push(Message::new(Role::Assistant, response.text.clone()));
        prompt.push(Message::new(Role::Assistant, response.text));

        for call in response.tool_calls {
            if cancel.is_cancelled() {
                return Ok(ReactOutcome {
                    output: last_output,
                    status: LoopStatus::Cancelled,
                    turns: turn - 1,
                    tool_calls,
                    new_messages,
                    input_tokens,
                    output_tokens,
                });
            }

            emit(
                deps.events,
                RuntimeEvent::ToolCall { call_id: call.id.clone(), tool: call.name.clone(), args: call.arguments.clone() },
            );

            let started_at = Utc::now();
            let started = Instant::now();
            let result = deps.tools.execute(deps.tool_ctx, &call.name, call.arguments.clone()).await;
            let duration = started.elapsed();

            let (tool_message, record) = match result {
                Ok(output) => {
                    emit(
                        deps.events,
                        RuntimeEvent::ToolResult {
                            call_id: call.id.clone(),
                            success: true,
                            output: serde_json::Value::String(output.clone()),
                        },
                    );
                    let record = ToolCallRecord {
                        id: call.id.clone(),
                        tool_name: call.name.clone(),
                        input: call.arguments.clone(),
                        output: Some(output.clone()),
                        error: None,
                        duration,
                        started_at,
                    };
                    (Message::tool_result(call.id.clone(), output), record)
                }
                Err(err) => {
                    let error_payload = serde_json::json!({ "error": err.to_string() });
                    emit(
                        deps.events,
                        RuntimeEvent::ToolResult { call_id: call.id.clone(), success: false, output: error_payload.clone() },
                    );
                    let record = ToolCallRecord {
                        id: call.id.clone(),
                        tool_name: call.name.clone(),
                        input: call.arguments.clone(),
                        output: None,
                        error: Some(err.to_string()),
                        duration,
                        started_at,
                    };
                    (Message::tool_result(call.id.clone(), error_payload.to_string()), record)
                }
            };

            tool_calls.push(record);
            new_messages.push(tool_message.clone());
            prompt.push(tool_message);
        }
    }

    Ok(ReactOutcome {
        output: last_output,
        status: LoopStatus::TurnLimitReached,
        turns: agent.max_turns,
        tool_calls,
        new_messages,
        input_tokens,
        output_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, LlmToolCall, StubLlmClient};
    use agentspec_runtime::budget::BudgetLimit;
    use agentspec_session::MemoryStrategy;
    use agentspec_tools::{CanonicalToolDef, CommandSpec, Executor};

    fn agent() -> ResolvedAgent {
        ResolvedAgent {
            fqn: "pkg/Agent/a".into(),
            name: "a".into(),
            model: "stub-model".into(),
            system_prompt: "be helpful".into(),
            skills: vec!["echo".into()],
            strategy: "react".into(),
            max_turns: 3,
            timeout: None,
            token_budget: None,
            temperature: None,
            stream: true,
            on_error: crate::project::OnError::Retry,
            max_retries: 3,
            fallback: None,
            memory: MemoryStrategy::default(),
            delegates: vec![],
            on_input: None,
            config_params: vec![],
        }
    }

    fn registry_with_echo() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(
            CanonicalToolDef { name: "echo".into(), description: "echoes input".into(), parameters_schema: serde_json::json!({}) },
            Executor::Command(CommandSpec {
                binary: "cat".into(),
                args: vec![],
                env: Default::default(),
                stdin: Some("hi".into()),
                timeout: Duration::from_secs(2),
                max_output_bytes: 1024 * 1024,
            }),
        );
        reg
    }

    #[tokio::test]
    async fn s3_react_with_one_tool_call_then_final_answer() {
        let llm = StubLlmClient::new(vec![
            Ok(LlmResponse {
                text: String::new(),
                tool_calls: vec![LlmToolCall { id: "call-1".into(), name: "echo".into(), arguments: serde_json::json!({}) }],
                input_tokens: 10,
                output_tokens: 5,
            }),
            Ok(LlmResponse { text: "echoed: hi".into(), tool_calls: vec![], input_tokens: 5, output_tokens: 3 }),
        ]);
        let registry = registry_with_echo();
        let tool_ctx = ToolContext::default();
        let budget = BudgetTracker::new(BudgetLimit::default());
        let cancel = CancellationToken::new();
        let deps = LoopDeps { llm: &llm, tools: &registry, tool_ctx: &tool_ctx, events: None };

        let outcome = run(&agent(), ReactInput { message: "hi".into(), ..Default::default() }, deps, &budget, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.status, LoopStatus::Completed);
        assert_eq!(outcome.turns, 2);
        assert_eq!(outcome.output, "echoed: hi");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].output.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn s4_token_budget_enforced_mid_turn() {
        let llm = StubLlmClient::new(vec![Ok(LlmResponse {
            text: "partial".into(),
            tool_calls: vec![],
            input_tokens: 60,
            output_tokens: 0,
        })]);
        let registry = ToolRegistry::new();
        let tool_ctx = ToolContext::default();
        let budget = BudgetTracker::new(BudgetLimit { max_tokens: Some(50), ..Default::default() });
        let cancel = CancellationToken::new();
        let deps = LoopDeps { llm: &llm, tools: &registry, tool_ctx: &tool_ctx, events: None };

        let outcome = run(&agent(), ReactInput { message: "hi".into(), ..Default::default() }, deps, &budget, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.status, LoopStatus::TokenBudgetExceeded);
        assert_eq!(outcome.turns, 1);
    }

    #[tokio::test]
    async fn s6_cancellation_before_first_turn_produces_no_session_messages() {
        let llm = StubLlmClient::new(vec![Ok(LlmResponse::default())]);
        let registry = ToolRegistry::new();
        let tool_ctx = ToolContext::default();
        let budget = BudgetTracker::new(BudgetLimit::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let deps = LoopDeps { llm: &llm, tools: &registry, tool_ctx: &tool_ctx, events: None };

        let outcome = run(&agent(), ReactInput { message: "hi".into(), ..Default::default() }, deps, &budget, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.status, LoopStatus::Cancelled);
        assert_eq!(outcome.output, "");
        assert!(outcome.new_messages.is_empty());
        assert!(outcome.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn turn_limit_exhaustion_reports_last_partial_output() {
        let always_calls_tool = (0..5)
            .map(|_| {
                Ok(LlmResponse {
                    text: "thinking".into(),
                    tool_calls: vec![LlmToolCall { id: "c".into(), name: "echo".into(), arguments: serde_json::json!({}) }],
                    input_tokens: 1,
                    output_tokens: 1,
                })
            })
            .collect();
        let llm = StubLlmClient::new(always_calls_tool);
        let registry = registry_with_echo();
        let tool_ctx = ToolContext::default();
        let budget = BudgetTracker::new(BudgetLimit::default());
        let cancel = CancellationToken::new();
        let deps = LoopDeps { llm: &llm, tools: &registry, tool_ctx: &tool_ctx, events: None };

        let mut a = agent();
        a.max_turns = 2;
        let outcome = run(&a, ReactInput { message: "hi".into(), ..Default::default() }, deps, &budget, &cancel).await.unwrap();

        assert_eq!(outcome.status, LoopStatus::TurnLimitReached);
        assert_eq!(outcome.turns, 2);
        assert_eq!(outcome.output, "thinking");
    }

    #[test]
    fn variable_substitution_replaces_all_occurrences() {
        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), "world".to_string());
        assert_eq!(render_variables("hello {{name}}, {{name}}!", &vars), "hello world, world!");
    }
}
