// SPDX-License-Identifier: MIT OR Apache-2.0
//! The AST shape this crate consumes.
//!
//! Parsing concrete syntax into this shape is out of scope here (the
//! hand-written recursive-descent parser is an external collaborator's
//! job); this module only defines the contract the lowerer reads.
//! A name reference inside a resource's attributes is already resolved by
//! the parser to a partially-qualified `"Kind/name"` string — the lowerer's
//! job is purely to prepend the package and flatten duplicates, never to
//! discover references itself.

use agentspec_core::Value;
use serde::{Deserialize, Serialize};

/// The package header: every document must open with one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageHeader {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Optional human-readable description.
    pub description: Option<String>,
}

/// One resource statement as the parser emits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStmt {
    /// Source-level kind identifier (e.g. `"Agent"`).
    pub kind: String,
    /// Package-local identifier.
    pub name: String,
    /// The attribute tree, already folded into the canonical `Value` union.
    pub attributes: Value,
    /// `"Kind/name"` references this resource depends on, in declaration
    /// order (may contain duplicates; the lowerer dedups them).
    pub references: Vec<String>,
}

/// A `policy` statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStmt {
    /// Policy name.
    pub name: String,
    /// Rules, in declaration order.
    pub rules: Vec<PolicyRuleStmt>,
}

/// One rule inside a `PolicyStmt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRuleStmt {
    /// The governed action.
    pub action: String,
    /// The FQN or glob the rule applies to.
    pub resource: String,
    /// Optional subject restriction.
    pub subject: Option<String>,
}

/// A legacy `binding` statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingStmt {
    /// Binding name.
    pub name: String,
    /// Adapter name.
    pub adapter: String,
    /// Whether this is the default binding.
    pub default: Option<bool>,
    /// Adapter-specific configuration.
    pub config: Option<Value>,
}

/// A `deploy` statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployTargetStmt {
    /// Target name.
    pub name: String,
    /// Target/adapter identifier.
    pub target: String,
    /// Whether this is the default target.
    pub default: Option<bool>,
    /// Target-specific configuration.
    pub config: Option<Value>,
}

/// An `import` statement: a path the importer resolves to another document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStmt {
    /// The import path as written in source, used as the key into the
    /// resolved import map the lowerer is given.
    pub path: String,
}

/// Any top-level statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// A resource declaration.
    Resource(ResourceStmt),
    /// A policy declaration.
    Policy(PolicyStmt),
    /// A legacy binding declaration.
    Binding(BindingStmt),
    /// A deploy target declaration.
    DeployTarget(DeployTargetStmt),
    /// An import declaration.
    Import(ImportStmt),
}

/// One parsed source file: an optional package header plus its statements.
///
/// `package` is optional at the AST level even though lowering a *root*
/// document requires one (`MissingPackage`) — an imported file
/// being merged in never contributes its own header, only its resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ast {
    /// The package header, if this file declares one.
    pub package: Option<PackageHeader>,
    /// The language version this source declares itself against.
    pub lang_version: String,
    /// Statements in declaration order.
    pub statements: Vec<Stmt>,
    /// Import paths referenced by this file, in declaration order.
    pub imports: Vec<ImportStmt>,
}
