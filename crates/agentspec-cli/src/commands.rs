// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared command implementations for the `agentspec` CLI.
//!
//! These functions are library-level so they can be tested without
//! spawning the binary.

use agentspec_compiler::{ast::Ast, check_acyclic, check_references, import, lower};
use agentspec_config::RuntimeConfig;
use agentspec_core::Document;
use agentspec_plan::{Action, ApplyResult};
use agentspec_runtime::invocation::InvocationReceipt;
use anyhow::{Context, Result};
use schemars::schema_for;
use std::collections::BTreeMap;
use std::path::Path;

/// Schema types that can be printed by the `schema` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// JSON schema for [`RuntimeConfig`].
    Config,
}

/// Return the JSON schema string for the given kind.
pub fn schema_json(kind: SchemaKind) -> Result<String> {
    let value = match kind {
        SchemaKind::Config => serde_json::to_value(schema_for!(RuntimeConfig))?,
    };
    serde_json::to_string_pretty(&value).context("serialize schema")
}

/// Read and parse a compiled IR document from `path`.
pub fn read_document(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read document '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse document from '{}'", path.display()))
}

/// Read and parse an AST file from `path`.
pub fn read_ast(path: &Path) -> Result<Ast> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read AST '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse AST from '{}'", path.display()))
}

/// Lower an AST into a document, merging any `path=document.json` import
/// entries (as `--import` flags give the `compile` subcommand) before
/// reference/cycle checks run.
///
/// Mirrors `agentspec_compiler`'s two-phase contract: lowering first, then
/// import merge, then whole-document validation — each import is itself a
/// pre-lowered [`Document`], since parsing concrete syntax is out of scope
/// here just as it is for the compiler crate.
pub fn compile(ast: &Ast, imports: &BTreeMap<String, Document>) -> Result<Document> {
    let doc = lower::lower(ast).context("lower AST")?;
    let doc = if imports.is_empty() { doc } else { import::merge(doc, imports).context("merge imports")? };
    check_references(&doc).context("check references")?;
    check_acyclic(&doc).context("check acyclic")?;
    Ok(doc)
}

/// Validate an already-compiled document: every reference resolves and the
/// resource graph is acyclic. Returns the list of problems found (empty on
/// success).
pub fn validate_document(doc: &Document) -> Vec<String> {
    let mut problems = Vec::new();
    if let Err(e) = check_references(doc) {
        problems.push(e.to_string());
    }
    if let Err(e) = check_acyclic(doc) {
        problems.push(e.to_string());
    }
    problems
}

/// Inspect an invocation receipt file: deserialize it and verify its hash.
///
/// Returns `(receipt, hash_valid)`.
pub fn inspect_receipt_file(path: &Path) -> Result<(InvocationReceipt, bool)> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read receipt file '{}'", path.display()))?;
    let receipt: InvocationReceipt =
        serde_json::from_str(&content).with_context(|| format!("parse receipt from '{}'", path.display()))?;
    let valid = receipt.is_hash_valid();
    Ok((receipt, valid))
}

/// Summarize a plan (the `Action` list a `plan` subcommand produced) as one
/// line per action, in plan order.
pub fn summarize_plan(actions: &[Action]) -> Vec<String> {
    actions
        .iter()
        .map(|a| match &a.reason {
            Some(reason) => format!("{:<8} {} ({reason})", a.action_type.as_str(), a.fqn),
            None => format!("{:<8} {}", a.action_type.as_str(), a.fqn),
        })
        .collect()
}

/// Summarize an apply run (the `ApplyResult` list an `apply` subcommand
/// produced) as one line per result, in apply order.
pub fn summarize_apply(results: &[ApplyResult]) -> Vec<String> {
    results
        .iter()
        .map(|r| {
            let status = format!("{:?}", r.status).to_lowercase();
            match (&r.artifact, &r.error) {
                (Some(artifact), _) => format!("{:<8} {} -> {artifact}", status, r.fqn),
                (None, Some(error)) => format!("{:<8} {} ({error})", status, r.fqn),
                (None, None) => format!("{:<8} {}", status, r.fqn),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentspec_compiler::ast::{PackageHeader, ResourceStmt, Stmt};
    use agentspec_core::Value;
    use agentspec_plan::ActionType;

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
    fn schema_config_is_valid_json() {
        let s = schema_json(SchemaKind::Config).unwrap();
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert!(v.get("properties").is_some());
    }

    #[test]
    fn compile_lowers_and_validates_a_minimal_document() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![resource("Prompt", "p1", vec![]), resource("Agent", "a", vec!["Prompt/p1"])],
            imports: vec![],
        };
        let doc = compile(&ast, &BTreeMap::new()).unwrap();
        assert_eq!(doc.resources.len(), 2);
    }

    #[test]
    fn compile_rejects_unresolved_reference() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![resource("Agent", "a", vec!["Prompt/missing"])],
            imports: vec![],
        };
        assert!(compile(&ast, &BTreeMap::new()).is_err());
    }

    #[test]
    fn validate_document_reports_dangling_reference() {
        let ast = Ast {
            package: Some(package("myapp")),
            lang_version: "1.0".into(),
            statements: vec![resource("Agent", "a", vec![])],
            imports: vec![],
        };
        let mut doc = lower::lower(&ast).unwrap();
        doc.resources[0].references.push("myapp/Prompt/missing".to_string());
        let problems = validate_document(&doc);
        assert_eq!(problems.len(), 1);
    }

    #[test]
    fn summarize_plan_includes_reason_when_present() {
        let resource = agentspec_core::Resource::new("pkg", agentspec_core::ResourceKind::Prompt, "p1", Value::Map(Default::default()), vec![]);
        let actions = vec![Action {
            fqn: resource.fqn.clone(),
            kind: resource.kind,
            action_type: ActionType::Update,
            resource_snapshot: Some(resource),
            prev_hash: Some("sha256:old".into()),
            reason: Some("attribute change".into()),
        }];
        let lines = summarize_plan(&actions);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("attribute change"));
    }

    #[test]
    fn inspect_receipt_valid_hash() {
        let receipt = InvocationReceipt::new(
            uuid::Uuid::new_v4(),
            "pkg/Agent/a",
            agentspec_runtime::event::Outcome::Success,
            3,
            42,
            0.0,
            10,
            chrono::Utc::now(),
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.json");
        std::fs::write(&path, serde_json::to_string_pretty(&receipt).unwrap()).unwrap();
        let (r, valid) = inspect_receipt_file(&path).unwrap();
        assert!(valid);
        assert_eq!(r.receipt_sha256, receipt.receipt_sha256);
    }

    #[test]
    fn inspect_receipt_tampered_hash_is_invalid() {
        let mut receipt = InvocationReceipt::new(
            uuid::Uuid::new_v4(),
            "pkg/Agent/a",
            agentspec_runtime::event::Outcome::Success,
            1,
            1,
            0.0,
            1,
            chrono::Utc::now(),
        );
        receipt.receipt_sha256 = "0000000000000000".to_string();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.json");
        std::fs::write(&path, serde_json::to_string_pretty(&receipt).unwrap()).unwrap();
        let (_, valid) = inspect_receipt_file(&path).unwrap();
        assert!(!valid);
    }
}
