// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! agentspec-core
//!
//! The stable contract for AgentSpec: the `Value` attribute union, the IR
//! data model (`Resource`, `Document`, FQNs), the canonical encoder and
//! content hasher, and the shared error taxonomy.
//!
//! If you only take one dependency, take this one.

/// The stable error catalog shared across every AgentSpec crate.
pub mod error;
/// The IR data model: resources, documents, and fully-qualified names.
pub mod ir;
/// The tagged attribute value union and its canonical encoding.
pub mod value;

pub use error::{AgentSpecError, ErrorCatalog, ErrorCode};
pub use ir::{fqn, parse_fqn, Binding, DeployTarget, Document, PackageInfo, Policy, PolicyRule, Resource, ResourceKind, IR_VERSION};
pub use value::{canonical, canonical_string, hash_attributes, sha256_hex, Value};

/// The IR schema version this implementation reads and writes.
pub const CONTRACT_VERSION: &str = "agentspec/v1.0";
