// SPDX-License-Identifier: MIT OR Apache-2.0
//! The stable AgentSpec error catalog.
//!
//! Every error code follows the pattern `AGSP-X###` where `X` is the
//! category letter and `###` is a three-digit number:
//!
//! - **C** — Compile-time (lowering, environment overlay, import merge)
//! - **P** — Plan / apply
//! - **R** — Runtime (server, agentic loop)
//! - **T** — Tool invocation
//! - **M** — MCP pool
//! - **X** — Expression evaluator
//! - **G** — Plugin host

use std::collections::BTreeMap;
use std::fmt;

/// Enumeration of all AgentSpec error codes, organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // ── Compile-time (C) ──────────────────────────────────────────────
    /// The source has no package header.
    MissingPackage,
    /// Two resources lowered to the same FQN.
    DuplicateFqn,
    /// A statement names a kind outside the closed set.
    UnknownKind,
    /// A reference does not resolve to any resource in the merged document.
    UnresolvedReference,
    /// The import graph contains a cycle.
    CircularImport,
    /// A resource's attributes violate its kind's schema.
    SchemaViolation,
    /// `apply_environment` named an environment that does not exist.
    UnknownEnvironment,
    /// An environment override names a resource/attribute that does not exist.
    OverrideTargetNotFound,

    // ── Plan / apply (P) ───────────────────────────────────────────────
    /// The adapter rejected the resource set during validation.
    AdapterValidationFailed,
    /// The adapter failed to apply an action.
    AdapterApplyFailed,
    /// The state file could not be written.
    StateWriteFailed,
    /// A dependency of this resource failed, so this action was skipped.
    ResourceFailedPrerequisite,

    // ── Runtime (R) ────────────────────────────────────────────────────
    /// No agent with the requested name is configured.
    AgentNotFound,
    /// No session with the requested id exists.
    SessionNotFound,
    /// No pipeline with the requested name is configured.
    PipelineNotFound,
    /// The request body is structurally invalid.
    InvalidRequest,
    /// The request carries no or an invalid credential.
    Unauthorized,
    /// The caller has exceeded its rate limit.
    RateLimited,
    /// The invocation's token budget was exceeded.
    TokenBudgetExceeded,
    /// The invocation exhausted `max_turns` without a final answer.
    TurnLimitReached,
    /// An unclassified internal failure.
    InternalError,

    // ── Tool (T) ───────────────────────────────────────────────────────
    /// No tool with the requested name is registered.
    ToolNotFound,
    /// The HTTP executor's outbound call returned a non-2xx status.
    ToolHttpError,
    /// The command executor's subprocess exited non-zero.
    ToolCommandError,
    /// A tool invocation exceeded its timeout.
    ToolTimeout,
    /// A tool's captured output exceeded the size cap.
    ToolOutputTooLarge,

    // ── MCP (M) ────────────────────────────────────────────────────────
    /// The MCP handshake failed.
    McpHandshakeFailed,
    /// The MCP server subprocess exited or crashed mid-request.
    McpServerCrashed,
    /// The MCP server sent a malformed or unexpected message.
    McpProtocolError,

    // ── Expression (X) ─────────────────────────────────────────────────
    /// An operator was applied to operands of an unsupported type.
    TypeMismatch,
    /// An identifier or property path has no binding in the environment.
    UndefinedIdentifier,
    /// An index or slice was out of the valid range.
    OutOfRange,

    // ── Plugin (G) ─────────────────────────────────────────────────────
    /// A plugin trapped, timed out, or exceeded its memory bound.
    PluginError,
}

impl ErrorCode {
    /// The stable `AGSP-X###` string for this code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            MissingPackage => "AGSP-C001",
            DuplicateFqn => "AGSP-C002",
            UnknownKind => "AGSP-C003",
            UnresolvedReference => "AGSP-C004",
            CircularImport => "AGSP-C005",
            SchemaViolation => "AGSP-C006",
            UnknownEnvironment => "AGSP-C007",
            OverrideTargetNotFound => "AGSP-C008",

            AdapterValidationFailed => "AGSP-P001",
            AdapterApplyFailed => "AGSP-P002",
            StateWriteFailed => "AGSP-P003",
            ResourceFailedPrerequisite => "AGSP-P004",

            AgentNotFound => "AGSP-R001",
            SessionNotFound => "AGSP-R002",
            PipelineNotFound => "AGSP-R003",
            InvalidRequest => "AGSP-R004",
            Unauthorized => "AGSP-R005",
            RateLimited => "AGSP-R006",
            TokenBudgetExceeded => "AGSP-R007",
            TurnLimitReached => "AGSP-R008",
            InternalError => "AGSP-R009",

            ToolNotFound => "AGSP-T001",
            ToolHttpError => "AGSP-T002",
            ToolCommandError => "AGSP-T003",
            ToolTimeout => "AGSP-T004",
            ToolOutputTooLarge => "AGSP-T005",

            McpHandshakeFailed => "AGSP-M001",
            McpServerCrashed => "AGSP-M002",
            McpProtocolError => "AGSP-M003",

            TypeMismatch => "AGSP-X001",
            UndefinedIdentifier => "AGSP-X002",
            OutOfRange => "AGSP-X003",

            PluginError => "AGSP-G001",
        }
    }

    /// The category letter this code belongs to.
    #[must_use]
    pub fn category(&self) -> &'static str {
        &self.code()[5..6]
    }

    /// A short, stable human-readable description of this code.
    #[must_use]
    pub fn description(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            MissingPackage => "source has no package header",
            DuplicateFqn => "two resources lowered to the same fully-qualified name",
            UnknownKind => "statement names a kind outside the closed resource kind set",
            UnresolvedReference => "reference does not resolve within the merged document",
            CircularImport => "import graph contains a cycle",
            SchemaViolation => "resource attributes violate the kind's schema",
            UnknownEnvironment => "named environment does not exist",
            OverrideTargetNotFound => "environment override target does not exist",
            AdapterValidationFailed => "adapter rejected the resource set",
            AdapterApplyFailed => "adapter failed to apply an action",
            StateWriteFailed => "state file could not be written",
            ResourceFailedPrerequisite => "a dependency of this resource failed to apply",
            AgentNotFound => "no agent with that name is configured",
            SessionNotFound => "no session with that id exists",
            PipelineNotFound => "no pipeline with that name is configured",
            InvalidRequest => "request body is structurally invalid",
            Unauthorized => "request carries no or an invalid credential",
            RateLimited => "caller exceeded its rate limit",
            TokenBudgetExceeded => "invocation token budget exceeded",
            TurnLimitReached => "invocation exhausted max_turns",
            InternalError => "unclassified internal failure",
            ToolNotFound => "no tool with that name is registered",
            ToolHttpError => "HTTP executor received a non-2xx response",
            ToolCommandError => "command executor subprocess exited non-zero",
            ToolTimeout => "tool invocation exceeded its timeout",
            ToolOutputTooLarge => "tool output exceeded the size cap",
            McpHandshakeFailed => "MCP handshake failed",
            McpServerCrashed => "MCP server subprocess exited or crashed mid-request",
            McpProtocolError => "MCP server sent a malformed or unexpected message",
            TypeMismatch => "operator applied to operands of an unsupported type",
            UndefinedIdentifier => "identifier has no binding in the environment",
            OutOfRange => "index or slice out of the valid range",
            PluginError => "plugin trapped, timed out, or exceeded its memory bound",
        }
    }
}

/// Every code in the catalog, in declaration order.
pub const ALL_CODES: &[ErrorCode] = &[
    ErrorCode::MissingPackage,
    ErrorCode::DuplicateFqn,
    ErrorCode::UnknownKind,
    ErrorCode::UnresolvedReference,
    ErrorCode::CircularImport,
    ErrorCode::SchemaViolation,
    ErrorCode::UnknownEnvironment,
    ErrorCode::OverrideTargetNotFound,
    ErrorCode::AdapterValidationFailed,
    ErrorCode::AdapterApplyFailed,
    ErrorCode::StateWriteFailed,
    ErrorCode::ResourceFailedPrerequisite,
    ErrorCode::AgentNotFound,
    ErrorCode::SessionNotFound,
    ErrorCode::PipelineNotFound,
    ErrorCode::InvalidRequest,
    ErrorCode::Unauthorized,
    ErrorCode::RateLimited,
    ErrorCode::TokenBudgetExceeded,
    ErrorCode::TurnLimitReached,
    ErrorCode::InternalError,
    ErrorCode::ToolNotFound,
    ErrorCode::ToolHttpError,
    ErrorCode::ToolCommandError,
    ErrorCode::ToolTimeout,
    ErrorCode::ToolOutputTooLarge,
    ErrorCode::McpHandshakeFailed,
    ErrorCode::McpServerCrashed,
    ErrorCode::McpProtocolError,
    ErrorCode::TypeMismatch,
    ErrorCode::UndefinedIdentifier,
    ErrorCode::OutOfRange,
    ErrorCode::PluginError,
];

/// Lookup and enumeration over the error catalog.
pub struct ErrorCatalog;

impl ErrorCatalog {
    /// Find a code by its stable string form (e.g. `"AGSP-C001"`).
    #[must_use]
    pub fn lookup(code: &str) -> Option<ErrorCode> {
        ALL_CODES.iter().copied().find(|c| c.code() == code)
    }

    /// All codes in the catalog.
    #[must_use]
    pub fn all() -> &'static [ErrorCode] {
        ALL_CODES
    }

    /// All codes in a given category (`"C"`, `"P"`, `"R"`, `"T"`, `"M"`, `"X"`, `"G"`).
    #[must_use]
    pub fn by_category(category: &str) -> Vec<ErrorCode> {
        ALL_CODES.iter().copied().filter(|c| c.category() == category).collect()
    }
}

/// A fully-formed error: a catalog code plus contextual key/value pairs and
/// an optional underlying cause.
#[derive(Debug)]
pub struct AgentSpecError {
    /// The catalog code.
    pub code: ErrorCode,
    /// A message describing this specific occurrence.
    pub message: String,
    /// Structured context (e.g. `"fqn" -> "pkg/Agent/a"`).
    pub context: BTreeMap<String, String>,
    /// The underlying cause, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AgentSpecError {
    /// Build an error from a code and message, with no context or cause.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        AgentSpecError { code, message: message.into(), context: BTreeMap::new(), source: None }
    }

    /// Attach a context key/value pair, builder-style.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach an underlying cause, builder-style.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for AgentSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for AgentSpecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|b| b.as_ref() as &(dyn std::error::Error + 'static))
    }
}
