// SPDX-License-Identifier: MIT OR Apache-2.0
//! Projects a compiled [`Document`] into the shapes the agentic loop and
//! pipeline executor actually run against: prompts spliced into each
//! agent's system prompt, defaults applied, skill/MCP-server/pipeline
//! lists carried through unchanged.

use crate::on_input::{parse_program, Statement};
use agentspec_core::{Document, Resource, ResourceKind, Value};
use agentspec_session::MemoryStrategy;
use std::collections::BTreeMap;
use std::time::Duration;

/// Failures projecting a document into runtime shapes.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// The document has no `Agent` resources at all.
    #[error("document has no Agent resources")]
    NoAgents,
    /// An agent's attribute had the wrong shape for the field it names.
    #[error("agent {agent:?}: attribute {field:?} must be a {expected}")]
    BadAttribute {
        /// The agent's FQN.
        agent: String,
        /// The offending attribute name.
        field: &'static str,
        /// The expected `Value` shape.
        expected: &'static str,
    },
    /// An agent declared a `model` attribute that was missing or empty.
    #[error("agent {0:?} has no model")]
    MissingModel(String),
    /// An `on_input` program failed to parse from its attribute shape.
    #[error("agent {agent:?}: on_input program is malformed: {reason}")]
    BadOnInput {
        /// The agent's FQN.
        agent: String,
        /// Parse failure detail.
        reason: String,
    },
}

/// How an agent recovers from a failed invocation (transport errors only;
/// tool errors are always fed back to the model, never treated as a
/// terminal failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    /// Retry the whole invocation up to `max_retries` times.
    Retry,
    /// Re-run the invocation against `fallback` with the same input.
    Fallback,
    /// Surface the error to the caller.
    Abort,
}

impl OnError {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "retry" => Some(OnError::Retry),
            "fallback" => Some(OnError::Fallback),
            "abort" => Some(OnError::Abort),
            _ => None,
        }
    }
}

/// A fully-resolved agent: system prompt spliced in, every default applied.
#[derive(Debug, Clone)]
pub struct ResolvedAgent {
    /// Fully-qualified name.
    pub fqn: String,
    /// Package-local name.
    pub name: String,
    /// The model identifier the loop should call.
    pub model: String,
    /// System prompt content: any inline `system_prompt` attribute followed
    /// by the content of every referenced `Prompt` resource, joined by
    /// `"\n\n"`.
    pub system_prompt: String,
    /// Names of skills (tools) this agent may call.
    pub skills: Vec<String>,
    /// Loop strategy; currently only `"react"` has a built-in implementation.
    pub strategy: String,
    /// Maximum agentic-loop turns.
    pub max_turns: u32,
    /// Wall-clock timeout for the whole invocation, if set.
    pub timeout: Option<Duration>,
    /// Cumulative token budget; `None` or zero means unlimited.
    pub token_budget: Option<u64>,
    /// Sampling temperature, if set.
    pub temperature: Option<f64>,
    /// Whether invocations against this agent stream events by default.
    pub stream: bool,
    /// Error-recovery policy.
    pub on_error: OnError,
    /// Retry attempts for `on_error == "retry"` (and for the fallback path).
    pub max_retries: u32,
    /// Fallback agent FQN, required when `on_error == "fallback"`.
    pub fallback: Option<String>,
    /// Session memory strategy.
    pub memory: MemoryStrategy,
    /// Agent FQNs this agent is allowed to delegate to.
    pub delegates: Vec<String>,
    /// Parsed `on_input` control-flow program, if the agent defines one.
    pub on_input: Option<Vec<Statement>>,
    /// Declared configurable parameter names (see `AGENTSPEC_<AGENT>_<PARAM>`).
    pub config_params: Vec<String>,
}

/// The document projected into runtime-ready shapes.
#[derive(Debug, Clone)]
pub struct ProjectedRuntime {
    /// Prompt FQN -> raw content, for inspection/debugging.
    pub prompts: BTreeMap<String, String>,
    /// Agent FQN -> resolved agent.
    pub agents: BTreeMap<String, ResolvedAgent>,
    /// `Skill` resources, carried through unchanged.
    pub skills: Vec<Resource>,
    /// `MCPServer` resources, carried through unchanged.
    pub mcp_servers: Vec<Resource>,
    /// `Pipeline` resources, carried through unchanged.
    pub pipelines: Vec<Resource>,
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

fn int_attr(attrs: &BTreeMap<String, Value>, key: &str) -> Option<i64> {
    match attrs.get(key) {
        Some(Value::Int(i)) => Some(*i),
        _ => None,
    }
}

fn float_attr(attrs: &BTreeMap<String, Value>, key: &str) -> Option<f64> {
    match attrs.get(key) {
        Some(Value::Float(f)) => Some(*f),
        Some(Value::Int(i)) => Some(*i as f64),
        _ => None,
    }
}

fn bool_attr(attrs: &BTreeMap<String, Value>, key: &str, default: bool) -> bool {
    match attrs.get(key) {
        Some(Value::Bool(b)) => *b,
        _ => default,
    }
}

fn prompt_content(resource: &Resource) -> &str {
    str_attr(as_map(&resource.attributes), "content").unwrap_or("")
}

fn resolve_memory(attrs: &BTreeMap<String, Value>) -> MemoryStrategy {
    let Some(memory) = attrs.get("memory").and_then(Value::as_map) else {
        return MemoryStrategy::default();
    };
    match str_attr(memory, "strategy") {
        Some("summary") => MemoryStrategy::Summary {
            threshold: int_attr(memory, "threshold").unwrap_or(100).max(1) as usize,
            keep: int_attr(memory, "keep").unwrap_or(20).max(0) as usize,
        },
        _ => MemoryStrategy::SlidingWindow {
            max_messages: int_attr(memory, "max_messages").unwrap_or(50).max(0) as usize,
        },
    }
}

fn resolve_agent(doc: &Document, resource: &Resource) -> Result<ResolvedAgent, ProjectionError> {
    let attrs = as_map(&resource.attributes);

    let model = str_attr(attrs, "model")
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ProjectionError::MissingModel(resource.fqn.clone()))?
        .to_string();

    let mut prompt_parts: Vec<String> = Vec::new();
    if let Some(inline) = str_attr(attrs, "system_prompt").filter(|s| !s.is_empty()) {
        prompt_parts.push(inline.to_string());
    }
    for reference in &resource.references {
        if let Some((_, ResourceKind::Prompt, _)) = agentspec_core::parse_fqn(reference)
            && let Some(prompt) = doc.find(reference)
        {
            let content = prompt_content(prompt);
            if !content.is_empty() {
                prompt_parts.push(content.to_string());
            }
        }
    }
    let system_prompt = prompt_parts.join("\n\n");

    let on_error = str_attr(attrs, "on_error").and_then(OnError::parse).unwrap_or(OnError::Retry);

    let fallback = str_attr(attrs, "fallback").map(str::to_string);

    let on_input = match attrs.get("on_input") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            parse_program(value)
                .map_err(|reason| ProjectionError::BadOnInput { agent: resource.fqn.clone(), reason })?,
        ),
    };

    let token_budget = int_attr(attrs, "token_budget").filter(|t| *t > 0).map(|t| t as u64);

    Ok(ResolvedAgent {
        fqn: resource.fqn.clone(),
        name: resource.name.clone(),
        model,
        system_prompt,
        skills: string_list_attr(attrs, "skills"),
        strategy: str_attr(attrs, "strategy").unwrap_or("react").to_string(),
        max_turns: int_attr(attrs, "max_turns").filter(|t| *t > 0).map(|t| t as u32).unwrap_or(10),
        timeout: int_attr(attrs, "timeout").filter(|t| *t > 0).map(|t| Duration::from_secs(t as u64)),
        token_budget,
        temperature: float_attr(attrs, "temperature"),
        stream: bool_attr(attrs, "stream", true),
        on_error,
        max_retries: int_attr(attrs, "max_retries").filter(|t| *t >= 0).map(|t| t as u32).unwrap_or(3),
        fallback,
        memory: resolve_memory(attrs),
        delegates: string_list_attr(attrs, "delegates"),
        on_input,
        config_params: string_list_attr(attrs, "config_params"),
    })
}

/// Project a compiled document into runtime-ready shapes.
///
/// Fails if the document contains zero `Agent` resources, or if an agent's
/// attributes don't conform to the shapes the loop needs (missing model,
/// malformed `on_input`).
pub fn project(doc: &Document) -> Result<ProjectedRuntime, ProjectionError> {
    let mut prompts = BTreeMap::new();
    let mut agents = BTreeMap::new();
    let mut skills = Vec::new();
    let mut mcp_servers = Vec::new();
    let mut pipelines = Vec::new();

    for resource in &doc.resources {
        match resource.kind {
            ResourceKind::Prompt => {
                prompts.insert(resource.fqn.clone(), prompt_content(resource).to_string());
            }
            ResourceKind::Agent => {
                let resolved = resolve_agent(doc, resource)?;
                agents.insert(resolved.fqn.clone(), resolved);
            }
            ResourceKind::Skill => skills.push(resource.clone()),
            ResourceKind::MCPServer => mcp_servers.push(resource.clone()),
            ResourceKind::Pipeline => pipelines.push(resource.clone()),
            _ => {}
        }
    }

    if agents.is_empty() {
        return Err(ProjectionError::NoAgents);
    }

    Ok(ProjectedRuntime { prompts, agents, skills, mcp_servers, pipelines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentspec_core::PackageInfo;

    fn doc_with(resources: Vec<Resource>) -> Document {
        Document {
            ir_version: "1.0".to_string(),
            lang_version: "1.0".to_string(),
            package: PackageInfo { name: "pkg".into(), version: "0.1.0".into(), description: None },
            resources,
            policies: vec![],
            bindings: vec![],
            deploy_targets: vec![],
        }
    }

    fn map_value(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn empty_document_fails_projection() {
        let doc = doc_with(vec![]);
        assert!(matches!(project(&doc), Err(ProjectionError::NoAgents)));
    }

    #[test]
    fn missing_model_is_an_error() {
        let agent = Resource::new("pkg", ResourceKind::Agent, "a", map_value(vec![]), vec![]);
        let doc = doc_with(vec![agent]);
        assert!(matches!(project(&doc), Err(ProjectionError::MissingModel(_))));
    }

    #[test]
    fn splices_referenced_prompt_content_and_applies_defaults() {
        let prompt = Resource::new(
            "pkg",
            ResourceKind::Prompt,
            "p1",
            map_value(vec![("content", Value::String("be helpful".into()))]),
            vec![],
        );
        let agent = Resource::new(
            "pkg",
            ResourceKind::Agent,
            "hello",
            map_value(vec![("model", Value::String("gpt-x".into()))]),
            vec![prompt.fqn.clone()],
        );
        let doc = doc_with(vec![agent, prompt]);
        let projected = project(&doc).unwrap();
        let resolved = projected.agents.get("pkg/Agent/hello").unwrap();
        assert_eq!(resolved.system_prompt, "be helpful");
        assert_eq!(resolved.strategy, "react");
        assert_eq!(resolved.max_turns, 10);
        assert!(resolved.stream);
        assert_eq!(resolved.on_error, OnError::Retry);
        assert_eq!(resolved.memory, MemoryStrategy::SlidingWindow { max_messages: 50 });
    }

    #[test]
    fn concatenates_inline_and_multiple_referenced_prompts() {
        let p1 = Resource::new(
            "pkg",
            ResourceKind::Prompt,
            "p1",
            map_value(vec![("content", Value::String("first".into()))]),
            vec![],
        );
        let p2 = Resource::new(
            "pkg",
            ResourceKind::Prompt,
            "p2",
            map_value(vec![("content", Value::String("second".into()))]),
            vec![],
        );
        let agent = Resource::new(
            "pkg",
            ResourceKind::Agent,
            "hello",
            map_value(vec![
                ("model", Value::String("gpt-x".into())),
                ("system_prompt", Value::String("inline".into())),
            ]),
            vec![p1.fqn.clone(), p2.fqn.clone()],
        );
        let doc = doc_with(vec![agent, p1, p2]);
        let projected = project(&doc).unwrap();
        let resolved = projected.agents.get("pkg/Agent/hello").unwrap();
        assert_eq!(resolved.system_prompt, "inline\n\nfirst\n\nsecond");
    }

    #[test]
    fn zero_token_budget_means_unlimited() {
        let agent = Resource::new(
            "pkg",
            ResourceKind::Agent,
            "a",
            map_value(vec![("model", Value::String("m".into())), ("token_budget", Value::Int(0))]),
            vec![],
        );
        let doc = doc_with(vec![agent]);
        let projected = project(&doc).unwrap();
        assert_eq!(projected.agents.get("pkg/Agent/a").unwrap().token_budget, None);
    }
}
