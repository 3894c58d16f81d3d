// SPDX-License-Identifier: MIT OR Apache-2.0
//! The actions a [`crate::planner::Planner`] emits and an
//! [`crate::adapter::Adapter`] carries out.

use agentspec_core::{Resource, ResourceKind};
use serde::{Deserialize, Serialize};

/// What a plan action does to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// The resource has no prior state entry.
    Create,
    /// The resource's attributes changed since the last apply, or the last
    /// apply attempt failed and is being retried.
    Update,
    /// The resource no longer appears in the desired document.
    Delete,
    /// The resource's hash matches state and the last apply succeeded.
    Noop,
}

impl ActionType {
    /// The lowercase string form used in plan output and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
            ActionType::Noop => "noop",
        }
    }
}

/// One entry in a plan: what to do to which resource, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// The resource's fully-qualified name.
    pub fqn: String,
    /// The resource's kind.
    pub kind: ResourceKind,
    /// What to do.
    pub action_type: ActionType,
    /// The resource as it stands in the desired document. Absent for
    /// `Delete`, since the desired document no longer carries it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_snapshot: Option<Resource>,
    /// The hash recorded in state before this action, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    /// Why this action was chosen (e.g. `"previous apply failed"`,
    /// `"attribute change"`, `"removed from document"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Action {
    pub(crate) fn create(resource: &Resource) -> Self {
        Action {
            fqn: resource.fqn.clone(),
            kind: resource.kind,
            action_type: ActionType::Create,
            resource_snapshot: Some(resource.clone()),
            prev_hash: None,
            reason: None,
        }
    }

    pub(crate) fn update(resource: &Resource, prev_hash: String, reason: &str) -> Self {
        Action {
            fqn: resource.fqn.clone(),
            kind: resource.kind,
            action_type: ActionType::Update,
            resource_snapshot: Some(resource.clone()),
            prev_hash: Some(prev_hash),
            reason: Some(reason.to_string()),
        }
    }

    pub(crate) fn noop(resource: &Resource, prev_hash: String) -> Self {
        Action {
            fqn: resource.fqn.clone(),
            kind: resource.kind,
            action_type: ActionType::Noop,
            resource_snapshot: Some(resource.clone()),
            prev_hash: Some(prev_hash),
            reason: None,
        }
    }

    pub(crate) fn delete(fqn: &str, kind: ResourceKind, prev_hash: String) -> Self {
        Action {
            fqn: fqn.to_string(),
            kind,
            action_type: ActionType::Delete,
            resource_snapshot: None,
            prev_hash: Some(prev_hash),
            reason: Some("removed from document".to_string()),
        }
    }

    /// The resource's package-local name, parsed out of its FQN.
    #[must_use]
    pub fn name(&self) -> &str {
        agentspec_core::parse_fqn(&self.fqn).map(|(_, _, name)| name).unwrap_or(&self.fqn)
    }
}
