// SPDX-License-Identifier: MIT OR Apache-2.0
//! The seam between the agentic loop and a concrete model backend.
//!
//! `agentspec-agent` never talks to a vendor API directly — callers supply
//! an [`LlmClient`] (one method in, one method out, no backend-specific
//! state leaking into the loop). Production wiring lives outside this
//! crate; tests and worked scenarios use [`StubLlmClient`].

use agentspec_session::Message;
use agentspec_tools::CanonicalToolDef;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// A single tool call the model requested.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmToolCall {
    /// The call's identifier, paired with the matching tool-result message.
    pub id: String,
    /// The tool name to invoke.
    pub name: String,
    /// Arguments to pass to the tool.
    pub arguments: JsonValue,
}

/// One turn's model call parameters.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The model identifier to call.
    pub model: String,
    /// The full prompt list for this turn (system + history + user/tool).
    pub messages: Vec<Message>,
    /// Tool definitions available for this turn.
    pub tools: Vec<CanonicalToolDef>,
    /// Sampling temperature, if the agent set one.
    pub temperature: Option<f64>,
}

/// One turn's model response.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Assistant text produced this turn, if any (may be empty alongside
    /// tool calls, or the final answer when `tool_calls` is empty).
    pub text: String,
    /// Tool calls requested this turn, in the order the model returned
    /// them (also their execution order).
    pub tool_calls: Vec<LlmToolCall>,
    /// Prompt tokens consumed this turn.
    pub input_tokens: u64,
    /// Completion tokens consumed this turn.
    pub output_tokens: u64,
}

/// Transport-level failures calling the model. Tool errors are never
/// represented here — they're fed back to the model as messages, not
/// raised.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// The underlying transport (HTTP, SDK, subprocess) failed.
    #[error("model call failed: {0}")]
    Transport(String),
}

/// A backend capable of running one agentic-loop turn.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one turn: send `request`, return the model's response.
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// A scripted, deterministic [`LlmClient`] for tests: returns one canned
/// [`LlmResponse`] per call, advancing through a fixed script and repeating
/// the last entry once exhausted.
///
/// Plays back a scripted sequence of responses instead of calling a real
/// vendor SDK.
pub struct StubLlmClient {
    script: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse, LlmError>>>,
    last: std::sync::Mutex<Option<Result<LlmResponse, LlmError>>>,
}

impl StubLlmClient {
    /// Build a stub that returns each response in `script`, in order, then
    /// repeats the final one for any calls beyond the script's length.
    #[must_use]
    pub fn new(script: Vec<Result<LlmResponse, LlmError>>) -> Self {
        Self { script: std::sync::Mutex::new(script.into()), last: std::sync::Mutex::new(None) }
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut script = self.script.lock().expect("stub script lock poisoned");
        if let Some(next) = script.pop_front() {
            let mut last = self.last.lock().expect("stub last lock poisoned");
            *last = Some(clone_result(&next));
            return next;
        }
        drop(script);
        let last = self.last.lock().expect("stub last lock poisoned");
        match last.as_ref() {
            Some(r) => clone_result(r),
            None => Ok(LlmResponse::default()),
        }
    }
}

fn clone_result(r: &Result<LlmResponse, LlmError>) -> Result<LlmResponse, LlmError> {
    match r {
        Ok(resp) => Ok(resp.clone()),
        Err(e) => Err(e.clone()),
    }
}
