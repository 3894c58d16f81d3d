// SPDX-License-Identifier: MIT OR Apache-2.0
//! AST → IR lowering.

use crate::ast::{Ast, Stmt};
use crate::CompileError;
use agentspec_core::{
    fqn, Binding, DeployTarget, Document, PackageInfo, Policy, PolicyRule, Resource, ResourceKind,
    IR_VERSION,
};
use std::collections::HashSet;

/// Lower a parsed [`Ast`] into a [`Document`].
///
/// Requires a package header (`CompileError::MissingPackage` otherwise).
/// Every resource statement becomes a [`Resource`] whose `references` are
/// the statement's `"Kind/name"` strings, deduplicated in declaration order
/// and prefixed with the package to form full FQNs. Duplicate FQNs within
/// one document fail with `CompileError::DuplicateFqn`; unrecognized kinds
/// fail with `CompileError::UnknownKind`.
///
/// Reference resolution against the full resource set (including merged
/// imports) is a separate step — see [`crate::import::merge`] — since a
/// reference may point at a resource this file doesn't itself declare.
pub fn lower(ast: &Ast) -> Result<Document, CompileError> {
    let package = ast.package.clone().ok_or(CompileError::MissingPackage)?;
    let package_info = PackageInfo {
        name: package.name.clone(),
        version: package.version,
        description: package.description,
    };

    let mut resources = Vec::new();
    let mut policies = Vec::new();
    let mut bindings = Vec::new();
    let mut deploy_targets = Vec::new();
    let mut seen_fqns: HashSet<String> = HashSet::new();

    for stmt in &ast.statements {
        match stmt {
            Stmt::Resource(r) => {
                let kind = ResourceKind::parse(&r.kind)
                    .ok_or_else(|| CompileError::UnknownKind(r.kind.clone()))?;
                let resource_fqn = fqn(&package.name, kind, &r.name);
                if !seen_fqns.insert(resource_fqn.clone()) {
                    return Err(CompileError::DuplicateFqn(resource_fqn));
                }

                let mut references = Vec::with_capacity(r.references.len());
                for reference in &r.references {
                    let full = format!("{}/{reference}", package.name);
                    if !references.contains(&full) {
                        references.push(full);
                    }
                }

                resources.push(Resource::new(&package.name, kind, &r.name, r.attributes.clone(), references));
            }
            Stmt::Policy(p) => {
                policies.push(Policy {
                    name: p.name.clone(),
                    rules: p
                        .rules
                        .iter()
                        .map(|r| PolicyRule { action: r.action.clone(), resource: r.resource.clone(), subject: r.subject.clone() })
                        .collect(),
                });
            }
            Stmt::Binding(b) => {
                bindings.push(Binding { name: b.name.clone(), adapter: b.adapter.clone(), default: b.default, config: b.config.clone() });
            }
            Stmt::DeployTarget(d) => {
                deploy_targets.push(DeployTarget {
                    name: d.name.clone(),
                    target: d.target.clone(),
                    default: d.default,
                    config: d.config.clone(),
                    legacy_binding: None,
                });
            }
            Stmt::Import(_) => {
                // Import resolution happens in `crate::import`, against the
                // caller-supplied resolved import map; the statement itself
                // carries no resource content to lower here.
            }
        }
    }

    let mut doc = Document {
        ir_version: IR_VERSION.to_string(),
        lang_version: ast.lang_version.clone(),
        package: package_info,
        resources,
        policies,
        bindings,
        deploy_targets,
    };
    doc.sort_resources();
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PackageHeader, ResourceStmt};
    use agentspec_core::Value;

    fn package(name: &str) -> PackageHeader {
        PackageHeader { name: name.to_string(), version: "0.1.0".to_string(), description: None }
    }

    fn resource(kind: &str, name: &str, references: Vec<&str>) -> Stmt {
        Stmt::Resource(ResourceStmt {
            kind: kind.to_string(),
            name: name.to_string(),
            attributes: Value::Null,
            references: references.into_iter().map(str::to_string).collect(),
        })
    }

    #[test]
    fn missing_package_header_fails() {
        let ast = Ast { package: None, lang_version: "1.0".into(), statements: vec![], imports: vec![] };
        assert!(matches!(lower(&ast), Err(CompileError::MissingPackage)));
    }

    #[test]
    fn resource_references_are_flattened_to_fqns() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![
                resource("Prompt", "p1", vec![]),
                resource("Agent", "a", vec!["Prompt/p1", "Prompt/p1"]),
            ],
            imports: vec![],
        };
        let doc = lower(&ast).unwrap();
        let agent = doc.find("myapp/Agent/a").unwrap();
        assert_eq!(agent.references, vec!["myapp/Prompt/p1".to_string()], "duplicate refs are deduped");
    }

    #[test]
    fn duplicate_fqn_within_one_document_fails() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![resource("Agent", "a", vec![]), resource("Agent", "a", vec![])],
            imports: vec![],
        };
        assert!(matches!(lower(&ast), Err(CompileError::DuplicateFqn(_))));
    }

    #[test]
    fn unknown_kind_fails() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![resource("Widget", "a", vec![])],
            imports: vec![],
        };
        assert!(matches!(lower(&ast), Err(CompileError::UnknownKind(_))));
    }

    #[test]
    fn resources_are_sorted_by_kind_then_name() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![resource("Skill", "b", vec![]), resource("Agent", "z", vec![]), resource("Agent", "a", vec![])],
            imports: vec![],
        };
        let doc = lower(&ast).unwrap();
        let names: Vec<_> = doc.resources.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["a", "z", "b"]);
    }
}
