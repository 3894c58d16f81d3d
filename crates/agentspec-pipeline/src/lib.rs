// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The multi-agent-step DAG pipeline executor: builds a graph
//! from each step's `depends_on` list, rejects cycles, then schedules steps
//! layer by layer — `parallel` steps within a layer run concurrently, the
//! rest run sequentially in declaration order. Each step's `when` clause
//! and input resolution run against the sandboxed expression language over
//! the trigger payload and prior steps' outputs.

/// Wraps an [`agentspec_agent::AgentRuntime`] as an [`executor::AgentInvoker`].
pub mod adapter;
/// Scheduling, expression evaluation, and failure propagation.
pub mod executor;
/// Parses a `Pipeline` resource's attributes into a step graph.
pub mod spec;

pub use adapter::RuntimeInvoker;
pub use executor::{run, AgentInvoker, PipelineError, PipelineRun, PipelineStatus, StepResult, StepStatus};
pub use spec::{parse, PipelineSpec, SpecError, StepSpec};
