// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP control-plane API types: request/response envelopes and the
//! canonical error shape returned on every failure path.

use agentspec_agent::{InvocationOutcome, ResolvedAgent};
use agentspec_core::error::ErrorCode;
use agentspec_pipeline::executor::{PipelineRun, StepStatus};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The single error type every handler in this crate returns. Carries a
/// stable [`ErrorCode`] that determines both the wire `code` string and the
/// HTTP status, plus a human-readable message.
#[derive(Debug)]
pub struct ApiError {
    /// The catalog code this failure maps to.
    pub code: ErrorCode,
    /// A message describing this specific occurrence.
    pub message: String,
}

impl ApiError {
    /// Build an error from a catalog code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError { code, message: message.into() }
    }

    /// The HTTP status this error's code maps to, per the category/variant
    /// table: 400 for malformed requests, 401 for missing/bad credentials,
    /// 404 for missing agents/sessions/pipelines, 429 for rate limiting, and
    /// 500 for everything else (compile/plan/tool/MCP/expression/plugin
    /// failures surfaced through the runtime are all internal from the HTTP
    /// caller's point of view).
    pub fn status(&self) -> StatusCode {
        use ErrorCode::*;
        match self.code {
            InvalidRequest => StatusCode::BAD_REQUEST,
            Unauthorized => StatusCode::UNAUTHORIZED,
            AgentNotFound | SessionNotFound | PipelineNotFound => StatusCode::NOT_FOUND,
            RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl std::error::Error for ApiError {}

/// The `{"error":{"code","message"}}` envelope written to the response body.
#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorEnvelope { error: ErrorBody { code: self.code.code(), message: &self.message } };
        (status, Json(body)).into_response()
    }
}

impl From<agentspec_session::SessionError> for ApiError {
    fn from(err: agentspec_session::SessionError) -> Self {
        match err {
            agentspec_session::SessionError::NotFound(id) => {
                ApiError::new(ErrorCode::SessionNotFound, format!("no session with id {id}"))
            }
            agentspec_session::SessionError::Backend(msg) => ApiError::new(ErrorCode::InternalError, msg),
        }
    }
}

impl From<agentspec_agent::InvokeError> for ApiError {
    fn from(err: agentspec_agent::InvokeError) -> Self {
        use agentspec_agent::InvokeError::*;
        match err {
            UnknownAgent(name) => ApiError::new(ErrorCode::AgentNotFound, format!("no agent named {name}")),
            UnknownFallback(name) => {
                ApiError::new(ErrorCode::AgentNotFound, format!("fallback agent {name} is not configured"))
            }
            Llm(e) => ApiError::new(ErrorCode::InternalError, e.to_string()),
            OnInput(e) => ApiError::new(ErrorCode::InternalError, e.to_string()),
            Session(e) => ApiError::from(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Response body for `GET /healthz`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` once the handler runs at all.
    pub status: String,
    /// The crate's IR version, for client compatibility checks.
    pub ir_version: String,
    /// Number of agents projected from the loaded document.
    pub agents_count: usize,
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// One entry in `GET /v1/agents`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSummary {
    /// The agent's fully-qualified name.
    pub fqn: String,
    /// The agent's short name.
    pub name: String,
    /// The model identifier the agent is configured to use.
    pub model: String,
    /// Maximum reasoning turns before the loop gives up.
    pub max_turns: u32,
    /// Whether this agent streams tokens by default.
    pub stream: bool,
}

impl From<&ResolvedAgent> for AgentSummary {
    fn from(agent: &ResolvedAgent) -> Self {
        AgentSummary {
            fqn: agent.fqn.clone(),
            name: agent.name.clone(),
            model: agent.model.clone(),
            max_turns: agent.max_turns,
            stream: agent.stream,
        }
    }
}

/// Response body for `GET /v1/agents`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentsListResponse {
    /// Every agent projected from the loaded document, in FQN order.
    pub agents: Vec<AgentSummary>,
}

// ---------------------------------------------------------------------------
// Invoke
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/agents/{name}/invoke` and `.../stream`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// The user-facing message to hand to the agent.
    pub message: String,
    /// Template variables available to prompt rendering.
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    /// An existing session to continue, if any.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Token accounting for one invocation.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt across all turns.
    pub input: u64,
    /// Tokens produced by the model across all turns.
    pub output: u64,
    /// Tokens served from a prompt cache, if the backend reports it.
    pub cache_read: u64,
    /// `input + output`.
    pub total: u64,
}

/// One recorded tool call in an invocation's trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallSummary {
    /// The tool's registered name.
    pub tool: String,
    /// The arguments passed to it.
    pub args: serde_json::Value,
    /// Its textual output.
    pub output: String,
}

/// Response body for `POST /v1/agents/{name}/invoke`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// The agent's final answer.
    pub output: String,
    /// Every tool call made while producing `output`, in call order.
    pub tool_calls: Vec<ToolCallSummary>,
    /// Token accounting for this invocation.
    pub tokens: TokenUsage,
    /// Number of reasoning turns consumed.
    pub turns: u32,
    /// Wall-clock duration of the invocation, in milliseconds.
    pub duration_ms: u64,
    /// The session this invocation was appended to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl InvokeResponse {
    /// Build a response from an [`InvocationOutcome`] and the duration the
    /// handler measured around the call.
    pub fn from_outcome(outcome: &InvocationOutcome, duration_ms: u64, session_id: Option<String>) -> Self {
        let tool_calls = outcome
            .tool_calls
            .iter()
            .map(|call| ToolCallSummary {
                tool: call.tool_name.clone(),
                args: call.input.clone(),
                output: call.output.clone().unwrap_or_default(),
            })
            .collect();
        let input = outcome.input_tokens;
        let output = outcome.output_tokens;
        InvokeResponse {
            output: outcome.output.clone(),
            tool_calls,
            tokens: TokenUsage { input, output, cache_read: 0, total: input + output },
            turns: outcome.receipt.turns_used,
            duration_ms,
            session_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Response body for `POST /v1/agents/{name}/sessions`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionCreatedResponse {
    /// The newly created session's id.
    pub session_id: String,
}

/// Response body for `DELETE /v1/agents/{name}/sessions/{id}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionClosedResponse {
    /// Echoes the id of the session that was closed.
    pub session_id: String,
    /// Always `"closed"`.
    pub status: &'static str,
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/pipelines/{name}/run`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineRunRequest {
    /// The trigger payload made available to each step's `when`/`input`
    /// expressions as `trigger`.
    #[serde(default)]
    pub trigger: serde_json::Value,
}

/// One step's outcome in `PipelineRunResponse`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineStepResponse {
    /// The step's name.
    pub name: String,
    /// The agent it invoked.
    pub agent: String,
    /// `completed | failed | skipped | cancelled`.
    pub status: String,
    /// The step's output, if it completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// The step's error, if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the step, in milliseconds.
    pub duration_ms: u64,
}

fn step_status_name(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Completed => "completed",
        StepStatus::Failed => "failed",
        StepStatus::Skipped => "skipped",
        StepStatus::Cancelled => "cancelled",
    }
}

/// Response body for `POST /v1/pipelines/{name}/run`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineRunResponse {
    /// The pipeline's name.
    pub pipeline: String,
    /// The run's overall status.
    pub status: String,
    /// Every step's result, in declared order.
    pub steps: Vec<PipelineStepResponse>,
    /// The last successfully-completed step's output, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<String>,
    /// Wall-clock duration of the whole run, in milliseconds.
    pub duration_ms: u64,
}

impl PipelineRunResponse {
    /// Translate an executor [`PipelineRun`] into the wire shape.
    pub fn from_run(run: &PipelineRun) -> Self {
        let status = match run.status {
            agentspec_pipeline::executor::PipelineStatus::Completed => "completed",
            agentspec_pipeline::executor::PipelineStatus::Failed => "failed",
            agentspec_pipeline::executor::PipelineStatus::Cancelled => "cancelled",
        };
        let steps = run
            .order
            .iter()
            .filter_map(|name| run.steps.get(name))
            .map(|step| PipelineStepResponse {
                name: step.name.clone(),
                agent: step.agent.clone(),
                status: step_status_name(step.status).to_string(),
                output: step.output.clone(),
                error: step.error.clone(),
                duration_ms: step.duration_ms,
            })
            .collect();
        PipelineRunResponse {
            pipeline: run.pipeline_name.clone(),
            status: status.to_string(),
            steps,
            final_output: run.final_output.clone(),
            duration_ms: run.elapsed_ms,
        }
    }
}
