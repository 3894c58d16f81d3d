// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request validation for the HTTP control-plane: shape checks for invoke,
//! session, and pipeline-run bodies, plus a depth/size guard against
//! attacker-controlled JSON (`variables`, `trigger`).

use crate::api::{InvokeRequest, PipelineRunRequest};

/// Depth and size limits for caller-supplied JSON (`variables`, `trigger`).
#[derive(Debug, Clone, Copy)]
pub struct JsonGuardLimits {
    /// Maximum nesting depth of objects/arrays.
    pub max_depth: usize,
    /// Maximum serialized size in bytes.
    pub max_size_bytes: usize,
}

impl JsonGuardLimits {
    /// Build a limit pair.
    pub fn new(max_depth: usize, max_size_bytes: usize) -> Self {
        JsonGuardLimits { max_depth, max_size_bytes }
    }
}

impl Default for JsonGuardLimits {
    fn default() -> Self {
        JsonGuardLimits { max_depth: 16, max_size_bytes: 1_000_000 }
    }
}

fn depth(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        serde_json::Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Validate a JSON value against depth/size limits, accumulating every
/// violation found.
pub fn validate_json_value(value: &serde_json::Value, limits: JsonGuardLimits) -> Vec<String> {
    let mut errors = Vec::new();
    let observed_depth = depth(value);
    if observed_depth > limits.max_depth {
        errors.push(format!("nesting depth {observed_depth} exceeds limit of {}", limits.max_depth));
    }
    match serde_json::to_vec(value) {
        Ok(bytes) if bytes.len() > limits.max_size_bytes => {
            errors.push(format!("value of {} bytes exceeds limit of {} bytes", bytes.len(), limits.max_size_bytes));
        }
        Err(e) => errors.push(format!("value is not serializable: {e}")),
        _ => {}
    }
    errors
}

/// Maximum allowed length for an invoke request's `message` field.
const MAX_MESSAGE_LENGTH: usize = 100_000;

/// Maximum allowed length for a session id.
const MAX_SESSION_ID_LENGTH: usize = 256;

/// Validates incoming API request bodies before they reach a handler.
pub struct RequestValidator;

impl RequestValidator {
    /// Validate an invoke/stream request body, accumulating every error
    /// found.
    pub fn validate_invoke_request(req: &InvokeRequest) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if req.message.trim().is_empty() {
            errors.push("message must not be empty".into());
        } else if req.message.len() > MAX_MESSAGE_LENGTH {
            errors.push(format!("message exceeds maximum length of {MAX_MESSAGE_LENGTH} characters"));
        }

        if let Some(session_id) = &req.session_id {
            if let Err(e) = Self::validate_session_id(session_id) {
                errors.push(e);
            }
        }

        for (key, value) in &req.variables {
            if key.is_empty() {
                errors.push("variable names must not be empty".into());
            }
            errors.extend(validate_json_value(value, JsonGuardLimits::default()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate that `id` is a well-formed, bounded session identifier.
    pub fn validate_session_id(id: &str) -> Result<(), String> {
        if id.is_empty() {
            return Err("session_id must not be empty".into());
        }
        if id.len() > MAX_SESSION_ID_LENGTH {
            return Err(format!("session_id exceeds maximum length of {MAX_SESSION_ID_LENGTH}"));
        }
        Ok(())
    }

    /// Validate a pipeline-run request's `trigger` payload.
    pub fn validate_pipeline_run_request(req: &PipelineRunRequest) -> Result<(), Vec<String>> {
        let errors = validate_json_value(&req.trigger, JsonGuardLimits::default());
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
