// SPDX-License-Identifier: MIT OR Apache-2.0
//! The IR data model: [`Resource`], [`Document`], and fully-qualified names.

use crate::value::{hash_attributes, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The finite set of resource kinds. Adding a kind is an intentional
/// language change, not an extension point — dispatch over `ResourceKind`
/// is always a closed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// An agent definition.
    Agent,
    /// A prompt template.
    Prompt,
    /// A skill (tool) definition.
    Skill,
    /// A secret reference.
    Secret,
    /// An MCP server definition.
    #[serde(rename = "MCPServer")]
    MCPServer,
    /// An MCP client definition.
    #[serde(rename = "MCPClient")]
    MCPClient,
    /// A custom type definition.
    Type,
    /// A pipeline definition.
    Pipeline,
    /// An environment overlay definition.
    Environment,
}

impl ResourceKind {
    /// Parse a kind from its source-level identifier.
    pub fn parse(s: &str) -> Option<ResourceKind> {
        Some(match s {
            "Agent" => ResourceKind::Agent,
            "Prompt" => ResourceKind::Prompt,
            "Skill" => ResourceKind::Skill,
            "Secret" => ResourceKind::Secret,
            "MCPServer" => ResourceKind::MCPServer,
            "MCPClient" => ResourceKind::MCPClient,
            "Type" => ResourceKind::Type,
            "Pipeline" => ResourceKind::Pipeline,
            "Environment" => ResourceKind::Environment,
            _ => return None,
        })
    }

    /// The source-level identifier for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Agent => "Agent",
            ResourceKind::Prompt => "Prompt",
            ResourceKind::Skill => "Skill",
            ResourceKind::Secret => "Secret",
            ResourceKind::MCPServer => "MCPServer",
            ResourceKind::MCPClient => "MCPClient",
            ResourceKind::Type => "Type",
            ResourceKind::Pipeline => "Pipeline",
            ResourceKind::Environment => "Environment",
        }
    }
}

/// Format a fully-qualified name: `{package}/{kind}/{name}`.
#[must_use]
pub fn fqn(package: &str, kind: ResourceKind, name: &str) -> String {
    format!("{package}/{}/{name}", kind.as_str())
}

/// Split a fully-qualified name into its `(package, kind, name)` parts.
///
/// Returns `None` if the string does not have exactly three `/`-separated
/// segments or the middle segment is not a recognized kind.
#[must_use]
pub fn parse_fqn(s: &str) -> Option<(&str, ResourceKind, &str)> {
    let mut parts = s.splitn(3, '/');
    let package = parts.next()?;
    let kind = parts.next()?;
    let name = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((package, ResourceKind::parse(kind)?, name))
}

/// The canonical unit of the IR: a single, content-addressed resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// The resource's kind.
    pub kind: ResourceKind,
    /// The package-local identifier.
    pub name: String,
    /// The resource's fully-qualified name. Globally unique within a [`Document`].
    pub fqn: String,
    /// The resource's attribute tree.
    pub attributes: Value,
    /// FQNs this resource depends on, declaration order, deduplicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    /// `"sha256:" + hex(SHA-256(canonical(attributes)))`.
    pub hash: String,
    /// Free-form, unhashed metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Resource {
    /// Build a resource, computing its FQN and hash from its attributes.
    #[must_use]
    pub fn new(
        package: &str,
        kind: ResourceKind,
        name: impl Into<String>,
        attributes: Value,
        references: Vec<String>,
    ) -> Self {
        let name = name.into();
        let hash = hash_attributes(&attributes);
        Resource {
            fqn: fqn(package, kind, &name),
            kind,
            name,
            attributes,
            references,
            hash,
            metadata: BTreeMap::new(),
        }
    }

    /// Recompute `hash` from the current `attributes`. Call after any
    /// in-place attribute mutation (e.g. environment overlay application).
    pub fn rehash(&mut self) {
        self.hash = hash_attributes(&self.attributes);
    }
}

/// The package header: `{name, version, description?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A policy statement: `{name, rules[{action, resource, subject?}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Action the rule governs (e.g. `"invoke"`, `"read"`).
    pub action: String,
    /// FQN or glob the rule applies to.
    pub resource: String,
    /// Optional subject restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// A named group of [`PolicyRule`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name.
    pub name: String,
    /// The rules this policy carries.
    pub rules: Vec<PolicyRule>,
}

/// A binding: the legacy compatibility shape for `deploy_targets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    /// Binding name.
    pub name: String,
    /// Adapter name this binding resolves to.
    pub adapter: String,
    /// Whether this is the default binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
    /// Adapter-specific configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// A deploy target: the canonical shape superseding [`Binding`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployTarget {
    /// Target name.
    pub name: String,
    /// Target/adapter identifier.
    pub target: String,
    /// Whether this is the default target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
    /// Target-specific configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    /// Set when this target was upcast from a legacy `bindings` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_binding: Option<bool>,
}

impl From<Binding> for DeployTarget {
    fn from(b: Binding) -> Self {
        DeployTarget {
            name: b.name,
            target: b.adapter,
            default: b.default,
            config: b.config,
            legacy_binding: Some(true),
        }
    }
}

/// The IR document: a fully-lowered, content-addressed unit of compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// IR schema version, currently `"1.0"`.
    pub ir_version: String,
    /// Source language version this document was lowered from.
    pub lang_version: String,
    /// Package header.
    pub package: PackageInfo,
    /// All resources, sorted by `(kind, name)`.
    pub resources: Vec<Resource>,
    /// Policy statements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<Policy>,
    /// Legacy binding statements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    /// Deploy target statements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deploy_targets: Vec<DeployTarget>,
}

/// The current IR schema version emitted by this implementation.
pub const IR_VERSION: &str = "1.0";

impl Document {
    /// Sort `resources` by `(kind, name)` in place. Resource list order must
    /// never affect downstream output — this is what keeps content hashing
    /// deterministic regardless of source file ordering.
    pub fn sort_resources(&mut self) {
        self.resources.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
    }

    /// Look up a resource by FQN.
    #[must_use]
    pub fn find(&self, fqn: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.fqn == fqn)
    }

    /// Look up a resource by FQN, mutably.
    pub fn find_mut(&mut self, fqn: &str) -> Option<&mut Resource> {
        self.resources.iter_mut().find(|r| r.fqn == fqn)
    }

    /// All FQNs referenced by any resource that are not present in this
    /// document's own resource list (invariant 2 violations, pre-import-merge).
    #[must_use]
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        let known: std::collections::HashSet<&str> =
            self.resources.iter().map(|r| r.fqn.as_str()).collect();
        let mut out = Vec::new();
        for r in &self.resources {
            for refd in &r.references {
                if !known.contains(refd.as_str()) {
                    out.push((r.fqn.clone(), refd.clone()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqn_round_trips() {
        let s = fqn("myapp", ResourceKind::Agent, "assistant");
        assert_eq!(s, "myapp/Agent/assistant");
        let (pkg, kind, name) = parse_fqn(&s).unwrap();
        assert_eq!(pkg, "myapp");
        assert_eq!(kind, ResourceKind::Agent);
        assert_eq!(name, "assistant");
    }

    #[test]
    fn parse_fqn_rejects_malformed_strings() {
        assert!(parse_fqn("too/few").is_none());
        assert!(parse_fqn("a/NotAKind/b").is_none());
        assert!(parse_fqn("a/Agent/b/c").is_none());
    }

    #[test]
    fn rehash_reflects_attribute_mutation() {
        let mut r = Resource::new(
            "pkg",
            ResourceKind::Prompt,
            "p1",
            Value::Map(BTreeMap::from([("text".to_string(), Value::String("hi".into()))])),
            vec![],
        );
        let before = r.hash.clone();
        if let Value::Map(m) = &mut r.attributes {
            m.insert("text".to_string(), Value::String("bye".into()));
        }
        r.rehash();
        assert_ne!(before, r.hash);
    }

    #[test]
    fn sort_resources_orders_by_kind_then_name() {
        let mut doc = Document {
            ir_version: IR_VERSION.to_string(),
            lang_version: "1.0".to_string(),
            package: PackageInfo { name: "pkg".into(), version: "0.1.0".into(), description: None },
            resources: vec![
                Resource::new("pkg", ResourceKind::Skill, "b", Value::Null, vec![]),
                Resource::new("pkg", ResourceKind::Agent, "z", Value::Null, vec![]),
                Resource::new("pkg", ResourceKind::Agent, "a", Value::Null, vec![]),
            ],
            policies: vec![],
            bindings: vec![],
            deploy_targets: vec![],
        };
        doc.sort_resources();
        let names: Vec<_> = doc.resources.iter().map(|r| (r.kind, r.name.clone())).collect();
        assert_eq!(
            names,
            vec![
                (ResourceKind::Agent, "a".to_string()),
                (ResourceKind::Agent, "z".to_string()),
                (ResourceKind::Skill, "b".to_string()),
            ]
        );
    }

    #[test]
    fn dangling_references_are_detected() {
        let doc = Document {
            ir_version: IR_VERSION.to_string(),
            lang_version: "1.0".to_string(),
            package: PackageInfo { name: "pkg".into(), version: "0.1.0".into(), description: None },
            resources: vec![Resource::new(
                "pkg",
                ResourceKind::Agent,
                "a",
                Value::Null,
                vec!["pkg/Prompt/missing".to_string()],
            )],
            policies: vec![],
            bindings: vec![],
            deploy_targets: vec![],
        };
        let dangling = doc.dangling_references();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].1, "pkg/Prompt/missing");
    }
}
