// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parses a `Pipeline` resource's attributes into [`PipelineSpec`].

use agentspec_core::{Resource, Value};
use agentspec_expr::{compile, ExprError, Program};
use std::collections::BTreeMap;

/// Failures turning a `Pipeline` resource's attributes into a [`PipelineSpec`].
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// The resource has no `steps` list, or it isn't a list.
    #[error("pipeline {0:?} has no steps")]
    NoSteps(String),
    /// A step entry wasn't a map, or was missing a required field.
    #[error("pipeline {pipeline:?} step {index}: {reason}")]
    BadStep {
        /// The pipeline's FQN.
        pipeline: String,
        /// The step's position in the `steps` list.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// A step's `when` or `input` expression failed to compile.
    #[error("pipeline {pipeline:?} step {step:?}: {field} expression: {source}")]
    BadExpression {
        /// The pipeline's FQN.
        pipeline: String,
        /// The step's name.
        step: String,
        /// Which field the expression came from (`"when"` or `"input"`).
        field: &'static str,
        /// The underlying compile error.
        source: ExprError,
    },
}

/// One step of a pipeline: which agent to call, its dependencies, and its
/// conditional/input expressions.
#[derive(Clone)]
pub struct StepSpec {
    /// The step's name, unique within its pipeline.
    pub name: String,
    /// Fully-qualified name of the agent this step invokes.
    pub agent: String,
    /// Step names this step depends on (must complete, successfully or not,
    /// before this step is scheduled).
    pub depends_on: Vec<String>,
    /// Whether this step may run concurrently with siblings in its layer.
    pub parallel: bool,
    /// Optional gating condition; if present and false, the step is skipped.
    pub when: Option<Program>,
    /// Optional explicit input expression; overrides the default input
    /// resolution (first dependency's output, then the trigger payload).
    pub input: Option<Program>,
}

impl std::fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("agent", &self.agent)
            .field("depends_on", &self.depends_on)
            .field("parallel", &self.parallel)
            .field("when", &self.when.is_some())
            .field("input", &self.input.is_some())
            .finish()
    }
}

/// A pipeline's full step graph, parsed once and reused across runs.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    /// The pipeline's fully-qualified name.
    pub fqn: String,
    /// The pipeline's package-local name.
    pub name: String,
    /// Steps in declaration order.
    pub steps: Vec<StepSpec>,
}

fn as_map(attrs: &Value) -> &BTreeMap<String, Value> {
    static EMPTY: std::sync::OnceLock<BTreeMap<String, Value>> = std::sync::OnceLock::new();
    attrs.as_map().unwrap_or_else(|| EMPTY.get_or_init(BTreeMap::new))
}

fn str_attr<'a>(attrs: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(Value::as_str)
}

fn string_list_attr(attrs: &BTreeMap<String, Value>, key: &str) -> Vec<String> {
    attrs
        .get(key)
        .and_then(Value::as_list)
        .map(|l| l.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn bool_attr(attrs: &BTreeMap<String, Value>, key: &str, default: bool) -> bool {
    match attrs.get(key) {
        Some(Value::Bool(b)) => *b,
        _ => default,
    }
}

fn parse_step(pipeline: &str, index: usize, value: &Value) -> Result<StepSpec, SpecError> {
    let attrs = value.as_map().ok_or_else(|| SpecError::BadStep {
        pipeline: pipeline.to_string(),
        index,
        reason: "step is not a map".to_string(),
    })?;

    let name = str_attr(attrs, "name")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SpecError::BadStep {
            pipeline: pipeline.to_string(),
            index,
            reason: "missing `name`".to_string(),
        })?
        .to_string();

    let agent = str_attr(attrs, "agent")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SpecError::BadStep {
            pipeline: pipeline.to_string(),
            index,
            reason: "missing `agent`".to_string(),
        })?
        .to_string();

    let when = match str_attr(attrs, "when") {
        Some(src) => Some(compile(src).map_err(|source| SpecError::BadExpression {
            pipeline: pipeline.to_string(),
            step: name.clone(),
            field: "when",
            source,
        })?),
        None => None,
    };

    let input = match str_attr(attrs, "input") {
        Some(src) => Some(compile(src).map_err(|source| SpecError::BadExpression {
            pipeline: pipeline.to_string(),
            step: name.clone(),
            field: "input",
            source,
        })?),
        None => None,
    };

    Ok(StepSpec {
        name,
        agent,
        depends_on: string_list_attr(attrs, "depends_on"),
        parallel: bool_attr(attrs, "parallel", false),
        when,
        input,
    })
}

/// Parse a `Pipeline` resource's `steps` attribute into a [`PipelineSpec`].
pub fn parse(resource: &Resource) -> Result<PipelineSpec, SpecError> {
    let attrs = as_map(&resource.attributes);
    let steps_value = attrs.get("steps").and_then(Value::as_list).ok_or_else(|| SpecError::NoSteps(resource.fqn.clone()))?;
    if steps_value.is_empty() {
        return Err(SpecError::NoSteps(resource.fqn.clone()));
    }
    let steps = steps_value
        .iter()
        .enumerate()
        .map(|(i, v)| parse_step(&resource.fqn, i, v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PipelineSpec { fqn: resource.fqn.clone(), name: resource.name.clone(), steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentspec_core::ResourceKind;

    fn step(name: &str, agent: &str, depends_on: &[&str], when: Option<&str>) -> Value {
        let mut m = BTreeMap::new();
        m.insert("name".to_string(), Value::String(name.to_string()));
        m.insert("agent".to_string(), Value::String(agent.to_string()));
        m.insert(
            "depends_on".to_string(),
            Value::List(depends_on.iter().map(|s| Value::String(s.to_string())).collect()),
        );
        if let Some(w) = when {
            m.insert("when".to_string(), Value::String(w.to_string()));
        }
        Value::Map(m)
    }

    #[test]
    fn parses_steps_with_dependencies_and_when_clause() {
        let steps = Value::List(vec![
            step("A", "pkg/Agent/x", &[], None),
            step("B", "pkg/Agent/y", &["A"], Some("len(steps.A.output) > 0")),
        ]);
        let mut attrs = BTreeMap::new();
        attrs.insert("steps".to_string(), steps);
        let resource = Resource::new("pkg", ResourceKind::Pipeline, "p", Value::Map(attrs), vec![]);
        let spec = parse(&resource).unwrap();
        assert_eq!(spec.steps.len(), 2);
        assert_eq!(spec.steps[1].depends_on, vec!["A".to_string()]);
        assert!(spec.steps[1].when.is_some());
    }

    #[test]
    fn missing_steps_is_an_error() {
        let resource = Resource::new("pkg", ResourceKind::Pipeline, "p", Value::Map(BTreeMap::new()), vec![]);
        assert!(matches!(parse(&resource), Err(SpecError::NoSteps(_))));
    }
}
