// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment overlay application.

use crate::CompileError;
use agentspec_core::{Document, ResourceKind, Value};

/// Apply the named environment's overrides to `doc`, returning a new,
/// independent `Document`. `doc` is never mutated — every guarantee this
/// function makes rests on the deep copy.
///
/// An empty `env_name` is a no-op: the document is cloned and returned
/// unchanged (still a copy, never the same resources array — but behavior-
/// identical). A non-empty name that does not match any `Environment`
/// resource fails with `CompileError::UnknownEnvironment`.
pub fn apply_environment(doc: &Document, env_name: &str) -> Result<Document, CompileError> {
    if env_name.is_empty() {
        return Ok(doc.clone());
    }

    let mut copy = doc.clone();
    let env_fqn = format!("{}/{}/{env_name}", doc.package.name, ResourceKind::Environment.as_str());
    let env_resource = copy
        .resources
        .iter()
        .find(|r| r.fqn == env_fqn)
        .ok_or_else(|| CompileError::UnknownEnvironment(env_name.to_string()))?
        .clone();

    let overrides = parse_overrides(&env_resource.attributes)?;
    let mut mutated_fqns = Vec::new();

    for ov in &overrides {
        let target_fqn = format!("{}/{}", doc.package.name, ov.resource);
        let target = copy
            .resources
            .iter_mut()
            .find(|r| r.fqn == target_fqn)
            .ok_or_else(|| CompileError::OverrideTargetNotFound(ov.resource.clone()))?;
        let map = target.attributes.as_map_mut().ok_or_else(|| {
            CompileError::OverrideTargetNotFound(format!("{} (attributes are not a mapping)", ov.resource))
        })?;
        map.insert(ov.attribute.clone(), ov.value.clone());
        mutated_fqns.push(target.fqn.clone());
    }

    for fqn in &mutated_fqns {
        if let Some(r) = copy.find_mut(fqn) {
            r.rehash();
        }
    }

    copy.resources.retain(|r| r.kind != ResourceKind::Environment);
    copy.sort_resources();
    Ok(copy)
}

struct Override {
    resource: String,
    attribute: String,
    value: Value,
}

fn parse_overrides(attrs: &Value) -> Result<Vec<Override>, CompileError> {
    let map = attrs.as_map().ok_or_else(|| CompileError::SchemaViolation("Environment.attributes must be a mapping".to_string()))?;
    let Some(Value::List(items)) = map.get("overrides") else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let entry = item.as_map().ok_or_else(|| CompileError::SchemaViolation("override entry must be a mapping".to_string()))?;
        let resource = entry
            .get("resource")
            .and_then(Value::as_str)
            .ok_or_else(|| CompileError::SchemaViolation("override entry missing string `resource`".to_string()))?
            .to_string();
        let attribute = entry
            .get("attribute")
            .and_then(Value::as_str)
            .ok_or_else(|| CompileError::SchemaViolation("override entry missing string `attribute`".to_string()))?
            .to_string();
        let value = entry
            .get("value")
            .cloned()
            .ok_or_else(|| CompileError::SchemaViolation("override entry missing `value`".to_string()))?;
        out.push(Override { resource, attribute, value });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentspec_core::{PackageInfo, Resource, IR_VERSION};
    use std::collections::BTreeMap;

    fn doc_with_agent_and_env() -> Document {
        let agent = Resource::new(
            "myapp",
            ResourceKind::Agent,
            "a",
            Value::Map(BTreeMap::from([("model".to_string(), Value::String("m-lo".into()))])),
            vec![],
        );
        let overrides = Value::List(vec![Value::Map(BTreeMap::from([
            ("resource".to_string(), Value::String("Agent/a".into())),
            ("attribute".to_string(), Value::String("model".into())),
            ("value".to_string(), Value::String("m-hi".into())),
        ]))]);
        let env = Resource::new(
            "myapp",
            ResourceKind::Environment,
            "prod",
            Value::Map(BTreeMap::from([("overrides".to_string(), overrides)])),
            vec![],
        );
        Document {
            ir_version: IR_VERSION.to_string(),
            lang_version: "1.0".to_string(),
            package: PackageInfo { name: "myapp".to_string(), version: "0.1.0".to_string(), description: None },
            resources: vec![agent, env],
            policies: vec![],
            bindings: vec![],
            deploy_targets: vec![],
        }
    }

    #[test]
    fn empty_env_name_returns_an_unchanged_copy() {
        let doc = doc_with_agent_and_env();
        let copy = apply_environment(&doc, "").unwrap();
        assert_eq!(copy.resources.len(), doc.resources.len());
    }

    #[test]
    fn overlay_applies_override_and_strips_environment_resources() {
        let doc = doc_with_agent_and_env();
        let overlaid = apply_environment(&doc, "prod").unwrap();

        assert!(overlaid.resources.iter().all(|r| r.kind != ResourceKind::Environment));
        let agent = overlaid.find("myapp/Agent/a").unwrap();
        assert_eq!(agent.attributes.as_map().unwrap().get("model").unwrap().as_str(), Some("m-hi"));

        // original document is untouched
        let original_agent = doc.find("myapp/Agent/a").unwrap();
        assert_eq!(original_agent.attributes.as_map().unwrap().get("model").unwrap().as_str(), Some("m-lo"));
    }

    #[test]
    fn overlay_recomputes_the_mutated_resources_hash() {
        let doc = doc_with_agent_and_env();
        let before = doc.find("myapp/Agent/a").unwrap().hash.clone();
        let overlaid = apply_environment(&doc, "prod").unwrap();
        let after = overlaid.find("myapp/Agent/a").unwrap().hash.clone();
        assert_ne!(before, after);
    }

    #[test]
    fn unknown_environment_name_fails() {
        let doc = doc_with_agent_and_env();
        assert!(matches!(apply_environment(&doc, "staging"), Err(CompileError::UnknownEnvironment(_))));
    }

    #[test]
    fn override_target_not_found_fails() {
        let mut doc = doc_with_agent_and_env();
        if let Some(env) = doc.resources.iter_mut().find(|r| r.kind == ResourceKind::Environment) {
            if let Value::Map(m) = &mut env.attributes {
                m.insert(
                    "overrides".to_string(),
                    Value::List(vec![Value::Map(BTreeMap::from([
                        ("resource".to_string(), Value::String("Agent/missing".into())),
                        ("attribute".to_string(), Value::String("model".into())),
                        ("value".to_string(), Value::String("x".into())),
                    ]))]),
                );
            }
        }
        assert!(matches!(apply_environment(&doc, "prod"), Err(CompileError::OverrideTargetNotFound(_))));
    }
}
