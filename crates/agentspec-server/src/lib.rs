// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! The HTTP control-plane: routes a running [`AgentRuntime`] and its
//! pipelines behind the wire contract of invoke/stream/session/pipeline
//! endpoints, a Prometheus scrape target, and a health probe.

pub mod api;
pub mod boot;
pub mod llm_http;
pub mod middleware;
pub mod validation;

pub use boot::{boot, BootError, BootOutput};
pub use llm_http::HttpLlmClient;

use agentspec_agent::{AgentRuntime, InvokeError};
use agentspec_core::error::ErrorCode;
use agentspec_pipeline::executor::{self as pipeline_executor, AgentInvoker, PipelineError};
use agentspec_pipeline::spec::{self as pipeline_spec, PipelineSpec};
use agentspec_runtime::event::RuntimeEvent;
use agentspec_runtime::invocation::Invocation;
use agentspec_session::SessionStore;
use agentspec_telemetry::metrics::{MetricsCollector, PrometheusExporter, RunMetrics, TelemetryExporter};
use api::{
    AgentSummary, AgentsListResponse, ApiError, HealthResponse, InvokeRequest, InvokeResponse,
    PipelineRunRequest, PipelineRunResponse, SessionClosedResponse, SessionCreatedResponse,
};
use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use middleware::{auth_middleware, rate_limit_middleware, request_id_middleware, AuthConfig, CorsConfig, RateLimiterRegistry, RequestLogger};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use validation::RequestValidator;

/// Everything a handler needs: the live agentic runtime, its pipeline
/// definitions (parsed once at startup), and the run-metrics collector
/// backing `GET /v1/metrics`.
#[derive(Clone)]
pub struct AppState {
    /// The agentic runtime handlers dispatch invocations through.
    pub runtime: Arc<AgentRuntime>,
    /// The session store, shared with the runtime, for direct
    /// create/close calls the runtime itself doesn't expose.
    pub sessions: Arc<dyn SessionStore>,
    /// Parsed pipeline specs, keyed by short name.
    pub pipelines: Arc<BTreeMap<String, PipelineSpec>>,
    /// Accumulated per-run metrics, exported as Prometheus text.
    pub metrics: Arc<MetricsCollector>,
    /// When this state was constructed, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Resolve a path-facing agent short name to its fully-qualified name.
    fn resolve_agent_fqn(&self, short_name: &str) -> Result<String, ApiError> {
        self.runtime
            .projected()
            .agents
            .values()
            .find(|agent| agent.name == short_name)
            .map(|agent| agent.fqn.clone())
            .ok_or_else(|| ApiError::new(ErrorCode::AgentNotFound, format!("no agent named {short_name}")))
    }
}

/// Invokes an [`AgentRuntime`] on behalf of the pipeline executor.
struct RuntimeInvoker(Arc<AgentRuntime>);

#[async_trait::async_trait]
impl AgentInvoker for RuntimeInvoker {
    async fn invoke(&self, agent_fqn: &str, input: serde_json::Value) -> Result<String, String> {
        let invocation = Invocation::new(agent_fqn, input);
        self.0.invoke(invocation).await.map(|outcome| outcome.output).map_err(|e| e.to_string())
    }
}

/// Build the full router: CORS wraps everything, `/healthz` sits outside
/// auth/rate-limiting, and every `/v1` route runs behind
/// auth → per-agent rate limit → body-size cap, in that order.
pub fn build_router(
    state: AppState,
    auth: AuthConfig,
    rate_limit_rps: u32,
    rate_limit_burst: u32,
    body_limit_bytes: usize,
    cors: &CorsConfig,
) -> Router {
    let auth = Arc::new(auth);
    let rate_limiter = Arc::new(RateLimiterRegistry::new(rate_limit_rps, rate_limit_burst));

    let v1 = Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/{name}/invoke", post(invoke_agent))
        .route("/agents/{name}/stream", post(stream_agent))
        .route("/agents/{name}/sessions", post(create_session))
        .route("/agents/{name}/sessions/{id}", post(continue_session).delete(close_session))
        .route("/pipelines/{name}/run", post(run_pipeline))
        .route("/metrics", get(metrics))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit_middleware))
        .layer(axum::middleware::from_fn_with_state(auth, auth_middleware));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", v1)
        .layer(cors.to_cors_layer())
        .layer(axum::middleware::from_fn(RequestLogger::layer))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        ir_version: agentspec_core::IR_VERSION.to_string(),
        agents_count: state.runtime.projected().agents.len(),
    })
}

async fn list_agents(State(state): State<AppState>) -> Json<AgentsListResponse> {
    let agents = state.runtime.projected().agents.values().map(AgentSummary::from).collect();
    Json(AgentsListResponse { agents })
}

async fn invoke_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    RequestValidator::validate_invoke_request(&req)
        .map_err(|errors| ApiError::new(ErrorCode::InvalidRequest, errors.join("; ")))?;

    let fqn = state.resolve_agent_fqn(&name)?;
    let started = Instant::now();
    let mut invocation = Invocation::new(fqn.clone(), build_invoke_input(&req));
    if let Some(session_id) = &req.session_id {
        invocation = invocation.with_session(session_id.clone());
    }

    let outcome = state.runtime.invoke(invocation).await.map_err(ApiError::from)?;
    let duration_ms = started.elapsed().as_millis() as u64;
    state.metrics.record(RunMetrics {
        agent_fqn: fqn,
        duration_ms,
        events_count: outcome.trace.len() + outcome.tool_calls.len(),
        tokens_in: outcome.input_tokens,
        tokens_out: outcome.output_tokens,
        tool_calls_count: outcome.tool_calls.len() as u64,
        errors_count: 0,
    });

    Ok(Json(InvokeResponse::from_outcome(&outcome, duration_ms, req.session_id)))
}

fn build_invoke_input(req: &InvokeRequest) -> serde_json::Value {
    if req.variables.is_empty() {
        serde_json::Value::String(req.message.clone())
    } else {
        let mut map = serde_json::Map::new();
        map.insert("message".to_string(), serde_json::Value::String(req.message.clone()));
        for (k, v) in &req.variables {
            map.insert(k.clone(), v.clone());
        }
        serde_json::Value::Object(map)
    }
}

async fn stream_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    RequestValidator::validate_invoke_request(&req)
        .map_err(|errors| ApiError::new(ErrorCode::InvalidRequest, errors.join("; ")))?;
    let fqn = state.resolve_agent_fqn(&name)?;

    let Some(bus) = state.runtime.events() else {
        return Err(ApiError::new(ErrorCode::InternalError, "runtime has no event bus configured"));
    };
    // Subscribe before kicking off the invocation so no early events are lost.
    let mut subscription = bus.subscribe();

    let mut invocation = Invocation::new(fqn, build_invoke_input(&req));
    if let Some(session_id) = &req.session_id {
        invocation = invocation.with_session(session_id.clone());
    }
    let runtime = Arc::clone(&state.runtime);
    tokio::spawn(async move {
        let _ = runtime.invoke(invocation).await;
    });

    let stream = futures::stream::unfold((subscription, false), |(mut sub, done)| async move {
        if done {
            return None;
        }
        let event = sub.recv().await?;
        let terminal = matches!(event, RuntimeEvent::Done { .. } | RuntimeEvent::Error { .. });
        Some((event, (sub, terminal)))
    })
    .map(|event| {
        let kind = agentspec_runtime::event::event_kind_name(&event).unwrap_or_else(|| "error".to_string());
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event(kind).data(data))
    });

    Ok(Sse::new(stream))
}

async fn create_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SessionCreatedResponse>, ApiError> {
    let fqn = state.resolve_agent_fqn(&name)?;
    let agent =
        state.runtime.projected().agents.get(&fqn).ok_or_else(|| ApiError::new(ErrorCode::AgentNotFound, &fqn))?;
    let session = state.sessions.create(&fqn, agent.memory.clone()).await?;
    Ok(Json(SessionCreatedResponse { session_id: session.id }))
}

async fn continue_session(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(mut req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    req.session_id = Some(id);
    invoke_agent(State(state), Path(name), Json(req)).await
}

async fn close_session(
    State(state): State<AppState>,
    Path((_name, id)): Path<(String, String)>,
) -> Result<Json<SessionClosedResponse>, ApiError> {
    state.sessions.close(&id).await?;
    Ok(Json(SessionClosedResponse { session_id: id, status: "closed" }))
}

async fn run_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<PipelineRunRequest>,
) -> Result<Json<PipelineRunResponse>, ApiError> {
    RequestValidator::validate_pipeline_run_request(&req)
        .map_err(|errors| ApiError::new(ErrorCode::InvalidRequest, errors.join("; ")))?;

    let spec = state
        .pipelines
        .get(&name)
        .ok_or_else(|| ApiError::new(ErrorCode::PipelineNotFound, format!("no pipeline named {name}")))?;

    let invoker = RuntimeInvoker(Arc::clone(&state.runtime));
    let run = pipeline_executor::run(spec, req.trigger, &invoker).await.map_err(|e: PipelineError| {
        ApiError::new(ErrorCode::InternalError, e.to_string())
    })?;

    Ok(Json(PipelineRunResponse::from_run(&run)))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.metrics.summary();
    let exporter = PrometheusExporter;
    match exporter.export(&summary) {
        Ok(body) => (axum::http::StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => ApiError::new(ErrorCode::InternalError, e).into_response(),
    }
}

/// Parse every `Pipeline` resource in a [`agentspec_agent::project::ProjectedRuntime`]
/// into a name-keyed map, skipping (and logging) any resource that fails to
/// parse rather than failing the whole boot.
pub fn parse_pipelines(pipelines: &[agentspec_core::Resource]) -> BTreeMap<String, PipelineSpec> {
    let mut out = BTreeMap::new();
    for resource in pipelines {
        match pipeline_spec::parse(resource) {
            Ok(spec) => {
                out.insert(resource.name.clone(), spec);
            }
            Err(e) => {
                tracing::warn!(pipeline = %resource.fqn, error = %e, "failed to parse pipeline spec, skipping");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pipelines_skips_resources_with_no_steps() {
        let resource = agentspec_core::Resource::new(
            "pkg",
            agentspec_core::ResourceKind::Pipeline,
            "empty",
            agentspec_core::Value::Map(Default::default()),
            vec![],
        );
        let parsed = parse_pipelines(&[resource]);
        assert!(parsed.is_empty());
    }
}
