// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The AgentSpec lowerer: AST → IR, import merge with Tarjan cycle
//! detection, and environment overlay application. This crate and
//! `agentspec-plan`'s desired-state engine form the compile-then-dispatch
//! core of the toolchain.

/// The AST shape this crate consumes (parsing concrete syntax is an
/// external collaborator's job).
pub mod ast;
/// Environment overlay application.
pub mod environment;
/// Import merge and cycle detection.
pub mod import;
/// AST → IR lowering.
pub mod lower;

pub use environment::apply_environment;
pub use import::{detect_cycles, merge};
pub use lower::lower;

/// Failures raised during lowering, import merge, or environment overlay.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The source has no package header.
    #[error("document has no package header")]
    MissingPackage,
    /// Two resources lowered to the same FQN.
    #[error("duplicate fully-qualified name: {0}")]
    DuplicateFqn(String),
    /// A statement names a kind outside the closed set.
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),
    /// A reference does not resolve to any resource in the merged document.
    #[error("unresolved reference: {0} (referenced by {1})")]
    UnresolvedReference(String, String),
    /// The import graph contains a cycle; every member is named.
    #[error("circular import: {}", .0.join(" -> "))]
    CircularImport(Vec<String>),
    /// A resource's attributes violate its kind's schema.
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    /// `apply_environment` named an environment that does not exist.
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),
    /// An environment override names a resource/attribute that does not exist.
    #[error("environment override target not found: {0}")]
    OverrideTargetNotFound(String),
}

/// Validate that every reference in `doc` resolves within `doc` itself.
/// Call this *after* import merge: reference resolution is scoped to the
/// post-merge document, not any one file in isolation.
pub fn check_references(doc: &agentspec_core::Document) -> Result<(), CompileError> {
    let dangling = doc.dangling_references();
    if let Some((from, to)) = dangling.into_iter().next() {
        return Err(CompileError::UnresolvedReference(to, from));
    }
    Ok(())
}

/// Check `doc`'s resource→references graph for a dependency cycle.
///
/// This is distinct from [`detect_cycles`], which operates on the
/// *file-level import graph*; this one requires no reference cycle in the
/// directed graph of resource→references over the resolved resource graph
/// itself.
pub fn check_acyclic(doc: &agentspec_core::Document) -> Result<(), CompileError> {
    let edges: Vec<(String, String)> = doc
        .resources
        .iter()
        .flat_map(|r| r.references.iter().map(move |to| (r.fqn.clone(), to.clone())))
        .collect();
    import::detect_cycles(&edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, PackageHeader, ResourceStmt, Stmt};
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
    fn end_to_end_lower_and_reference_check() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![resource("Prompt", "p1", vec![]), resource("Agent", "a", vec!["Prompt/p1"])],
            imports: vec![],
        };
        let doc = lower::lower(&ast).unwrap();
        assert!(check_references(&doc).is_ok());
        assert!(check_acyclic(&doc).is_ok());
    }

    #[test]
    fn unresolved_reference_is_reported() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![resource("Agent", "a", vec!["Prompt/missing"])],
            imports: vec![],
        };
        let doc = lower::lower(&ast).unwrap();
        assert!(matches!(check_references(&doc), Err(CompileError::UnresolvedReference(_, _))));
    }

    #[test]
    fn resource_reference_cycle_is_detected() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![resource("Agent", "a", vec!["Agent/b"]), resource("Agent", "b", vec!["Agent/a"])],
            imports: vec![],
        };
        let doc = lower::lower(&ast).unwrap();
        assert!(check_acyclic(&doc).is_err());
    }
}
