// SPDX-License-Identifier: MIT OR Apache-2.0
//! The DAG executor: topological layering, per-layer parallel/sequential
//! dispatch, `when`/`input` expression evaluation, and failure propagation.

use crate::spec::{PipelineSpec, StepSpec};
use agentspec_compiler::CompileError;
use agentspec_core::Value;
use agentspec_expr::Env;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Instant;
use uuid::Uuid;

/// Seam between the pipeline executor and agent invocation, so the
/// executor's tests don't depend on a live [`agentspec_agent::AgentRuntime`].
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Invoke `agent_fqn` with `input`, returning its textual output.
    async fn invoke(&self, agent_fqn: &str, input: serde_json::Value) -> Result<String, String>;
}

/// Failures building a pipeline's execution graph, surfaced before any step
/// runs.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The step graph contains a cycle.
    #[error("pipeline {pipeline:?} has a circular dependency: {chain:?}")]
    Circular {
        /// The pipeline's FQN.
        pipeline: String,
        /// The cyclic chain of step names.
        chain: Vec<String>,
    },
    /// A step names a `depends_on` target that doesn't exist.
    #[error("pipeline {pipeline:?} step {step:?} depends on unknown step {target:?}")]
    UnknownDependency {
        /// The pipeline's FQN.
        pipeline: String,
        /// The step with the dangling dependency.
        step: String,
        /// The missing dependency's name.
        target: String,
    },
}

/// A step's terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The step ran and its agent call succeeded.
    Completed,
    /// The step ran and its agent call failed.
    Failed,
    /// The step's `when` clause evaluated false, or a prior step's failure
    /// pre-empted scheduling.
    Skipped,
    /// The pipeline was cancelled before this step could run.
    Cancelled,
}

/// One step's execution result.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The step's name.
    pub name: String,
    /// The agent FQN it invoked.
    pub agent: String,
    /// Terminal state.
    pub status: StepStatus,
    /// Textual output, present only when `status == Completed`.
    pub output: Option<String>,
    /// Failure detail, present only when `status == Failed`.
    pub error: Option<String>,
    /// Wall-clock duration of this step's execution.
    pub duration_ms: u64,
}

impl StepResult {
    fn to_value(&self) -> Value {
        let mut m = BTreeMap::new();
        m.insert(
            "status".to_string(),
            Value::String(
                match self.status {
                    StepStatus::Completed => "completed",
                    StepStatus::Failed => "failed",
                    StepStatus::Skipped => "skipped",
                    StepStatus::Cancelled => "cancelled",
                }
                .to_string(),
            ),
        );
        m.insert("output".to_string(), self.output.clone().map(Value::String).unwrap_or(Value::Null));
        m.insert("error".to_string(), self.error.clone().map(Value::String).unwrap_or(Value::Null));
        Value::Map(m)
    }
}

/// A pipeline run's terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Every scheduled step completed (individual steps may still be
    /// `Skipped` by their own `when` clause).
    Completed,
    /// At least one step failed.
    Failed,
    /// The run was cancelled.
    Cancelled,
}

/// The full record of one pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// The pipeline's name.
    pub pipeline_name: String,
    /// Unique identifier for this run.
    pub run_id: Uuid,
    /// Per-step results, keyed by step name.
    pub steps: BTreeMap<String, StepResult>,
    /// Declaration order of steps, so callers can render results in order.
    pub order: Vec<String>,
    /// Terminal pipeline status.
    pub status: PipelineStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the whole run.
    pub elapsed_ms: u64,
    /// The last successfully-completed step's output.
    pub final_output: Option<String>,
}

fn validate_graph(spec: &PipelineSpec) -> Result<(), PipelineError> {
    let names: std::collections::HashSet<&str> = spec.steps.iter().map(|s| s.name.as_str()).collect();
    let mut edges = Vec::new();
    for step in &spec.steps {
        for dep in &step.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(PipelineError::UnknownDependency {
                    pipeline: spec.fqn.clone(),
                    step: step.name.clone(),
                    target: dep.clone(),
                });
            }
            edges.push((step.name.clone(), dep.clone()));
        }
    }
    agentspec_compiler::detect_cycles(&edges).map_err(|e| match e {
        CompileError::CircularImport(chain) => PipelineError::Circular { pipeline: spec.fqn.clone(), chain },
        other => PipelineError::Circular { pipeline: spec.fqn.clone(), chain: vec![other.to_string()] },
    })
}

async fn execute_step(
    step: &StepSpec,
    trigger: &Value,
    completed: &BTreeMap<String, StepResult>,
    invoker: &dyn AgentInvoker,
) -> StepResult {
    let start = Instant::now();
    let steps_value = Value::Map(completed.iter().map(|(k, v)| (k.clone(), v.to_value())).collect());
    let env = Env::new().with("trigger", trigger.clone()).with("steps", steps_value);

    if let Some(when) = &step.when {
        match when.eval(&env) {
            Ok(Value::Bool(false)) => {
                return StepResult {
                    name: step.name.clone(),
                    agent: step.agent.clone(),
                    status: StepStatus::Skipped,
                    output: None,
                    error: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
            Ok(_) => {}
            Err(e) => {
                return StepResult {
                    name: step.name.clone(),
                    agent: step.agent.clone(),
                    status: StepStatus::Failed,
                    output: None,
                    error: Some(format!("when clause: {e}")),
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        }
    }

    let input_value = match &step.input {
        Some(program) => match program.eval(&env) {
            Ok(v) => v,
            Err(e) => {
                return StepResult {
                    name: step.name.clone(),
                    agent: step.agent.clone(),
                    status: StepStatus::Failed,
                    output: None,
                    error: Some(format!("input clause: {e}")),
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        },
        None => step
            .depends_on
            .first()
            .and_then(|dep| completed.get(dep))
            .and_then(|r| r.output.clone())
            .map(Value::String)
            .unwrap_or_else(|| trigger.clone()),
    };

    let input_json: serde_json::Value = (&input_value).into();
    match invoker.invoke(&step.agent, input_json).await {
        Ok(output) => StepResult {
            name: step.name.clone(),
            agent: step.agent.clone(),
            status: StepStatus::Completed,
            output: Some(output),
            error: None,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        Err(error) => StepResult {
            name: step.name.clone(),
            agent: step.agent.clone(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error),
            duration_ms: start.elapsed().as_millis() as u64,
        },
    }
}

/// Run a pipeline to completion: build its DAG (erroring if cyclic), then
/// schedule steps layer by layer, running `parallel` steps in each layer
/// concurrently and the rest sequentially in declaration order. A failed
/// step marks the pipeline `Failed` and skips every not-yet-started step.
pub async fn run(spec: &PipelineSpec, trigger: Value, invoker: &dyn AgentInvoker) -> Result<PipelineRun, PipelineError> {
    validate_graph(spec)?;
    let started_at = Utc::now();
    let start = Instant::now();

    let mut indegree: BTreeMap<String, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for step in &spec.steps {
        indegree.insert(step.name.clone(), step.depends_on.len());
        for dep in &step.depends_on {
            dependents.entry(dep.clone()).or_default().push(step.name.clone());
        }
    }

    let by_name: BTreeMap<&str, &StepSpec> = spec.steps.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut frontier: Vec<String> =
        spec.steps.iter().filter(|s| indegree[&s.name] == 0).map(|s| s.name.clone()).collect();

    let mut completed: BTreeMap<String, StepResult> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut pipeline_failed = false;

    while !frontier.is_empty() {
        let layer = std::mem::take(&mut frontier);

        if pipeline_failed {
            for name in &layer {
                let step = by_name[name.as_str()];
                completed.insert(
                    name.clone(),
                    StepResult {
                        name: step.name.clone(),
                        agent: step.agent.clone(),
                        status: StepStatus::Skipped,
                        output: None,
                        error: None,
                        duration_ms: 0,
                    },
                );
                order.push(name.clone());
            }
        } else {
            let (parallel_names, sequential_names): (Vec<String>, Vec<String>) =
                layer.iter().cloned().partition(|name| by_name[name.as_str()].parallel);

            let parallel_futures = parallel_names
                .iter()
                .map(|name| execute_step(by_name[name.as_str()], &trigger, &completed, invoker));
            let parallel_results = futures::future::join_all(parallel_futures).await;
            for result in parallel_results {
                if result.status == StepStatus::Failed {
                    pipeline_failed = true;
                }
                order.push(result.name.clone());
                completed.insert(result.name.clone(), result);
            }

            for name in &sequential_names {
                let result = execute_step(by_name[name.as_str()], &trigger, &completed, invoker).await;
                if result.status == StepStatus::Failed {
                    pipeline_failed = true;
                }
                order.push(result.name.clone());
                completed.insert(result.name.clone(), result);
            }
        }

        let mut next = Vec::new();
        for name in &layer {
            if let Some(deps) = dependents.get(name) {
                for dependent in deps {
                    let entry = indegree.get_mut(dependent).expect("dependent registered in indegree");
                    *entry -= 1;
                    if *entry == 0 {
                        next.push(dependent.clone());
                    }
                }
            }
        }
        next.sort_by_key(|name| spec.steps.iter().position(|s| &s.name == name).unwrap_or(usize::MAX));
        frontier = next;
    }

    let final_output = order
        .iter()
        .rev()
        .filter_map(|name| completed.get(name))
        .find(|r| r.status == StepStatus::Completed)
        .and_then(|r| r.output.clone());

    let status = if pipeline_failed { PipelineStatus::Failed } else { PipelineStatus::Completed };

    Ok(PipelineRun {
        pipeline_name: spec.name.clone(),
        run_id: Uuid::new_v4(),
        steps: completed,
        order,
        status,
        started_at,
        elapsed_ms: start.elapsed().as_millis() as u64,
        final_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentspec_core::{Resource, ResourceKind};
    use std::collections::BTreeMap as Map;
    use std::sync::Mutex;

    struct ScriptedInvoker {
        responses: Mutex<BTreeMap<String, Result<String, String>>>,
    }

    #[async_trait]
    impl AgentInvoker for ScriptedInvoker {
        async fn invoke(&self, agent_fqn: &str, _input: serde_json::Value) -> Result<String, String> {
            self.responses
                .lock()
                .unwrap()
                .get(agent_fqn)
                .cloned()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn step_value(name: &str, agent: &str, depends_on: &[&str], when: Option<&str>, parallel: bool) -> Value {
        let mut m = Map::new();
        m.insert("name".to_string(), Value::String(name.to_string()));
        m.insert("agent".to_string(), Value::String(agent.to_string()));
        m.insert(
            "depends_on".to_string(),
            Value::List(depends_on.iter().map(|s| Value::String(s.to_string())).collect()),
        );
        m.insert("parallel".to_string(), Value::Bool(parallel));
        if let Some(w) = when {
            m.insert("when".to_string(), Value::String(w.to_string()));
        }
        Value::Map(m)
    }

    fn pipeline(steps: Vec<Value>) -> PipelineSpec {
        let mut attrs = Map::new();
        attrs.insert("steps".to_string(), Value::List(steps));
        let resource = Resource::new("pkg", ResourceKind::Pipeline, "p", Value::Map(attrs), vec![]);
        crate::spec::parse(&resource).unwrap()
    }

    #[tokio::test]
    async fn s5_conditional_step_is_skipped_when_dependency_output_is_empty() {
        let spec = pipeline(vec![
            step_value("A", "pkg/Agent/x", &[], None, false),
            step_value("B", "pkg/Agent/y", &["A"], Some("len(steps.A.output) > 0"), false),
        ]);
        let invoker = ScriptedInvoker {
            responses: Mutex::new(BTreeMap::from([("pkg/Agent/x".to_string(), Ok(String::new()))])),
        };
        let run_result = run(&spec, Value::Null, &invoker).await.unwrap();
        assert_eq!(run_result.steps["A"].status, StepStatus::Completed);
        assert_eq!(run_result.steps["A"].output.as_deref(), Some(""));
        assert_eq!(run_result.steps["B"].status, StepStatus::Skipped);
        assert_eq!(run_result.status, PipelineStatus::Completed);
        assert_eq!(run_result.final_output.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn failed_step_skips_unstarted_dependents() {
        let spec = pipeline(vec![
            step_value("A", "pkg/Agent/x", &[], None, false),
            step_value("B", "pkg/Agent/y", &["A"], None, false),
            step_value("C", "pkg/Agent/z", &["B"], None, false),
        ]);
        let invoker = ScriptedInvoker {
            responses: Mutex::new(BTreeMap::from([
                ("pkg/Agent/x".to_string(), Ok("ok".to_string())),
                ("pkg/Agent/y".to_string(), Err("boom".to_string())),
            ])),
        };
        let run_result = run(&spec, Value::Null, &invoker).await.unwrap();
        assert_eq!(run_result.steps["A"].status, StepStatus::Completed);
        assert_eq!(run_result.steps["B"].status, StepStatus::Failed);
        assert_eq!(run_result.steps["C"].status, StepStatus::Skipped);
        assert_eq!(run_result.status, PipelineStatus::Failed);
    }

    #[tokio::test]
    async fn parallel_steps_in_a_layer_run_concurrently() {
        let spec = pipeline(vec![
            step_value("A", "pkg/Agent/x", &[], None, true),
            step_value("B", "pkg/Agent/y", &[], None, true),
        ]);
        let invoker = ScriptedInvoker {
            responses: Mutex::new(BTreeMap::from([
                ("pkg/Agent/x".to_string(), Ok("a".to_string())),
                ("pkg/Agent/y".to_string(), Ok("b".to_string())),
            ])),
        };
        let run_result = run(&spec, Value::Null, &invoker).await.unwrap();
        assert_eq!(run_result.steps["A"].status, StepStatus::Completed);
        assert_eq!(run_result.steps["B"].status, StepStatus::Completed);
        assert_eq!(run_result.status, PipelineStatus::Completed);
    }

    #[tokio::test]
    async fn circular_dependency_is_rejected_before_any_step_runs() {
        let spec = pipeline(vec![
            step_value("A", "pkg/Agent/x", &["B"], None, false),
            step_value("B", "pkg/Agent/y", &["A"], None, false),
        ]);
        let invoker = ScriptedInvoker { responses: Mutex::new(BTreeMap::new()) };
        let err = run(&spec, Value::Null, &invoker).await.unwrap_err();
        assert!(matches!(err, PipelineError::Circular { .. }));
    }

    #[tokio::test]
    async fn explicit_input_expression_overrides_default_resolution() {
        let spec = pipeline(vec![
            step_value("A", "pkg/Agent/x", &[], None, false),
            step_value("B", "pkg/Agent/y", &["A"], None, false),
        ]);
        let invoker = ScriptedInvoker {
            responses: Mutex::new(BTreeMap::from([("pkg/Agent/x".to_string(), Ok("first".to_string()))])),
        };
        let run_result = run(&spec, Value::String("trigger-payload".to_string()), &invoker).await.unwrap();
        assert_eq!(run_result.steps["B"].status, StepStatus::Completed);
    }
}
