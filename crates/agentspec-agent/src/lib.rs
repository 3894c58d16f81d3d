// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The agentic loop: IR-to-runtime projection, the ReAct turn loop, the
//! `on_input` control-flow interpreter, and the dispatcher tying them
//! together with session state, the tool registry, and the `on_error`
//! recovery policy.

/// The model-backend seam (`LlmClient`) and a deterministic test double.
pub mod llm;
/// The `on_input` control-flow interpreter: parsing and execution.
pub mod on_input;
/// Projects a compiled `Document` into runtime-ready agent shapes.
pub mod project;
/// The ReAct turn loop: one invocation attempt.
pub mod react;
/// The dispatcher: ReAct vs `on_input`, retry/fallback/abort, and the
/// skill/delegate seams `on_input` calls back through.
pub mod runtime;

pub use llm::{LlmClient, LlmError, LlmRequest, LlmResponse, LlmToolCall, StubLlmClient};
pub use on_input::{ActivityEntry, Delegator, OnInputError, OnInputOutcome, SkillInvoker};
pub use project::{project, OnError, ProjectedRuntime, ProjectionError, ResolvedAgent};
pub use react::{LoopDeps, LoopStatus, ReactInput, ReactOutcome, ToolCallRecord};
pub use runtime::{AgentRuntime, InvocationOutcome, InvokeError};
