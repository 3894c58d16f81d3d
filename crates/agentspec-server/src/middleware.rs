// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack for the AgentSpec HTTP control-plane: request ids,
//! structured request logging, bearer/API-key auth, a per-agent token-bucket
//! rate limiter, and CORS.

use crate::api::ApiError;
use agentspec_core::error::ErrorCode;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RequestId middleware
// ---------------------------------------------------------------------------

/// A unique request identifier, available as an Axum extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Axum middleware that generates a [`RequestId`] for each request and sets
/// the `X-Request-Id` response header.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    resp.headers_mut().insert("x-request-id", HeaderValue::from_str(&id.0.to_string()).unwrap());
    resp
}

// ---------------------------------------------------------------------------
// RequestLogger
// ---------------------------------------------------------------------------

/// Axum middleware that logs method, path, status code, and duration for each
/// request using [`tracing`] structured fields.
pub struct RequestLogger;

impl RequestLogger {
    /// Axum-compatible handler function.
    pub async fn layer(req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let start = Instant::now();

        let resp = next.run(req).await;

        let duration = start.elapsed();
        let status = resp.status().as_u16();

        info!(
            http.method = %method,
            http.path = %path,
            http.status = status,
            http.duration_ms = duration.as_millis() as u64,
            "request completed"
        );

        resp
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Bearer/API-key credential configuration shared across requests.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// The expected credential. `None` means no credential can ever match
    /// (auth is effectively disabled only via `no_auth`).
    pub api_key: Option<String>,
    /// When `true`, every request is allowed regardless of credential.
    pub no_auth: bool,
}

fn extract_credential(req: &Request) -> Option<String> {
    if let Some(key) = req.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Axum middleware enforcing the `X-API-Key` / `Authorization: Bearer`
/// credential unless `no_auth` is set.
pub async fn auth_middleware(State(cfg): State<Arc<AuthConfig>>, req: Request, next: Next) -> Response {
    if cfg.no_auth {
        return next.run(req).await;
    }
    match (&cfg.api_key, extract_credential(&req)) {
        (Some(expected), Some(got)) if &got == expected => next.run(req).await,
        _ => ApiError::new(ErrorCode::Unauthorized, "missing or invalid credential").into_response(),
    }
}

// ---------------------------------------------------------------------------
// Per-agent token-bucket rate limiter
// ---------------------------------------------------------------------------

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(burst: u32) -> Self {
        TokenBucket { tokens: f64::from(burst), last_refill: Instant::now() }
    }

    /// Refills by elapsed time at `rps` tokens/sec (capped at `burst`), then
    /// takes one token if available. Returns the remaining token count.
    fn try_take(&mut self, rps: u32, burst: u32) -> Option<f64> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * f64::from(rps)).min(f64::from(burst));
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Some(self.tokens)
        } else {
            None
        }
    }
}

/// Per-agent token-bucket limiter. Requests are bucketed by the `{name}`
/// path segment following `/v1/agents/` or `/v1/pipelines/`; requests with no
/// such segment (health, metrics) are never limited.
pub struct RateLimiterRegistry {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    rps: u32,
    burst: u32,
}

impl RateLimiterRegistry {
    /// Build a registry allowing `rps` tokens/sec refill up to `burst`
    /// tokens per distinct agent.
    pub fn new(rps: u32, burst: u32) -> Self {
        RateLimiterRegistry { buckets: Mutex::new(HashMap::new()), rps, burst }
    }

    /// Consume one token for `key`, returning the tokens remaining on
    /// success or `None` if the bucket is exhausted.
    pub async fn check(&self, key: &str) -> Option<f64> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_take(self.rps, self.burst)
    }

    /// The configured sustained rate, for response headers.
    pub fn rps(&self) -> u32 {
        self.rps
    }

    /// The configured burst capacity, for response headers.
    pub fn burst(&self) -> u32 {
        self.burst
    }
}

/// Extracts the agent/pipeline name this request is scoped to, from a path
/// like `/v1/agents/{name}/invoke` or `/v1/pipelines/{name}/run`.
fn scoped_name(path: &str) -> Option<&str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "agents" || segment == "pipelines" {
            return segments.next();
        }
    }
    None
}

/// Axum middleware enforcing the per-agent rate limit and attaching
/// `X-RateLimit-*` headers to the response.
pub async fn rate_limit_middleware(
    State(registry): State<Arc<RateLimiterRegistry>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(name) = scoped_name(req.uri().path()) else {
        return next.run(req).await;
    };
    let name = name.to_string();
    match registry.check(&name).await {
        Some(remaining) => {
            let mut resp = next.run(req).await;
            let headers = resp.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from_str(&registry.burst().to_string()).unwrap());
            headers.insert(
                "x-ratelimit-remaining",
                HeaderValue::from_str(&(remaining.floor() as u64).to_string()).unwrap(),
            );
            resp
        }
        None => {
            let mut resp = ApiError::new(ErrorCode::RateLimited, format!("rate limit exceeded for {name}"))
                .into_response();
            resp.headers_mut()
                .insert("x-ratelimit-limit", HeaderValue::from_str(&registry.burst().to_string()).unwrap());
            resp.headers_mut().insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            resp
        }
    }
}

// ---------------------------------------------------------------------------
// CorsConfig
// ---------------------------------------------------------------------------

/// Configuration for CORS headers.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Origins allowed to make cross-origin requests.
    pub allowed_origins: Vec<String>,
    /// HTTP methods allowed cross-origin.
    pub allowed_methods: Vec<String>,
    /// Headers allowed cross-origin.
    pub allowed_headers: Vec<String>,
}

impl CorsConfig {
    /// Convert this configuration into a [`tower_http::cors::CorsLayer`].
    pub fn to_cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self.allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
        let methods: Vec<axum::http::Method> = self.allowed_methods.iter().filter_map(|m| m.parse().ok()).collect();
        let headers: Vec<axum::http::HeaderName> = self.allowed_headers.iter().filter_map(|h| h.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(AllowMethods::list(methods))
            .allow_headers(AllowHeaders::list(headers))
    }
}
