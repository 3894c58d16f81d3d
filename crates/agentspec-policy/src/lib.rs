// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Evaluates a `Document`'s `policies[]` (`Policy`/`PolicyRule`) against an
//! `(action, resource fqn, subject?)` request.
//!
//! A policy rule's `resource` field is compiled as a glob over FQNs via
//! `agentspec_glob`, generalized from single-pattern path matching to the
//! allow-if-any-rule-matches semantics a deploy-time access policy needs.

use agentspec_core::{Policy, PolicyRule};
use agentspec_glob::build_globset;

/// The outcome of evaluating a request against a set of policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// At least one rule across the evaluated policies granted the request.
    Allowed,
    /// No rule granted the request. The default posture is deny.
    Denied,
}

impl Decision {
    /// Returns `true` for [`Decision::Allowed`].
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Errors compiling a policy's rules into a matcher.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A rule's `resource` field was not a valid glob pattern.
    #[error("policy {policy:?} rule {index} has an invalid resource pattern: {source}")]
    InvalidPattern {
        /// The owning policy's name.
        policy: String,
        /// The rule's index within `policy.rules`.
        index: usize,
        /// The underlying glob compile error.
        #[source]
        source: anyhow::Error,
    },
}

/// One compiled rule: an action, a compiled FQN glob, and an optional
/// subject restriction.
struct CompiledRule {
    action: String,
    resource: globset::GlobSet,
    subject: Option<String>,
}

/// A compiled view over a document's `policies[]`, ready for repeated
/// `(action, resource, subject)` evaluation without recompiling patterns.
///
/// Rules across all policies are evaluated as one flat allow-list: a
/// request is [`Decision::Allowed`] if *any* rule, in any policy, matches
/// on action, resource glob, and (if set) subject. There is no explicit
/// `Deny` effect in the IR's `PolicyRule` shape — absence of a matching
/// rule is the only way to deny, which is why this engine is a pure
/// allow-list rather than a priority-ordered allow/deny/log/throttle rule
/// set.
pub struct PolicyEngine {
    rules: Vec<CompiledRule>,
}

const WILDCARD_ACTION: &str = "*";

impl PolicyEngine {
    /// Compile every policy's rules into a single evaluator.
    pub fn compile(policies: &[Policy]) -> Result<Self, PolicyError> {
        let mut rules = Vec::new();
        for policy in policies {
            for (index, rule) in policy.rules.iter().enumerate() {
                rules.push(Self::compile_rule(policy, index, rule)?);
            }
        }
        Ok(PolicyEngine { rules })
    }

    fn compile_rule(policy: &Policy, index: usize, rule: &PolicyRule) -> Result<CompiledRule, PolicyError> {
        let resource = build_globset(std::slice::from_ref(&rule.resource))
            .map_err(|source| PolicyError::InvalidPattern { policy: policy.name.clone(), index, source })?
            .expect("single-element pattern list always yields a globset");
        Ok(CompiledRule { action: rule.action.clone(), resource, subject: rule.subject.clone() })
    }

    /// Evaluate whether `subject` may perform `action` on `resource_fqn`.
    ///
    /// `subject` is `None` for unauthenticated or system-internal callers;
    /// rules that restrict to a subject never match an absent one.
    #[must_use]
    pub fn evaluate(&self, action: &str, resource_fqn: &str, subject: Option<&str>) -> Decision {
        let allowed = self.rules.iter().any(|rule| {
            (rule.action == WILDCARD_ACTION || rule.action == action)
                && rule.resource.is_match(resource_fqn)
                && match (&rule.subject, subject) {
                    (None, _) => true,
                    (Some(required), Some(given)) => required == given,
                    (Some(_), None) => false,
                }
        });
        if allowed {
            Decision::Allowed
        } else {
            Decision::Denied
        }
    }

    /// Whether this engine has no rules at all (an empty document's default).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
