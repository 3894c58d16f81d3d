// SPDX-License-Identifier: MIT OR Apache-2.0
//! The diff between a desired [`Document`] and the current [`StateMap`].

use crate::action::{Action, ActionType};
use agentspec_core::{Document, Resource, ResourceKind};
use agentspec_state::{ApplyStatus, StateMap};
use std::collections::{HashMap, HashSet};

/// Computes plans: the ordered set of actions that take current state to
/// the desired document.
pub struct Planner;

impl Planner {
    /// Diff `doc` against `state`, returning actions in apply order:
    /// deletes, then updates (including retries), then creates — each
    /// bucket topologically ordered by `references` so a resource is never
    /// created or updated before something it depends on, ties broken by
    /// `(kind, name)` — followed by a `(kind, name)`-ordered noop bucket.
    #[must_use]
    pub fn plan(doc: &Document, state: &StateMap) -> Vec<Action> {
        let mut creates: Vec<&Resource> = Vec::new();
        let mut updates: Vec<(&Resource, String, &'static str)> = Vec::new();
        let mut noops: Vec<(&Resource, String)> = Vec::new();

        for resource in &doc.resources {
            match state.0.get(&resource.fqn) {
                None => creates.push(resource),
                Some(entry) => {
                    if entry.hash == resource.hash {
                        if entry.status == ApplyStatus::Applied {
                            noops.push((resource, entry.hash.clone()));
                        } else {
                            updates.push((resource, entry.hash.clone(), "previous apply failed"));
                        }
                    } else {
                        updates.push((resource, entry.hash.clone(), "attribute change"));
                    }
                }
            }
        }

        let desired: HashSet<&str> = doc.resources.iter().map(|r| r.fqn.as_str()).collect();
        let mut deletes: Vec<(String, ResourceKind, String)> = state
            .0
            .iter()
            .filter(|(fqn, _)| !desired.contains(fqn.as_str()))
            .map(|(fqn, entry)| {
                let kind = ResourceKind::parse(&entry.kind).unwrap_or(ResourceKind::Agent);
                (fqn.clone(), kind, entry.hash.clone())
            })
            .collect();
        deletes.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));

        let mut out: Vec<Action> = Vec::new();
        for (fqn, kind, hash) in deletes {
            out.push(Action::delete(&fqn, kind, hash));
        }
        for resource in topo_order(updates.iter().map(|(r, _, _)| *r).collect()) {
            let (_, hash, reason) = updates.iter().find(|(r, _, _)| r.fqn == resource.fqn).unwrap();
            out.push(Action::update(resource, hash.clone(), reason));
        }
        for resource in topo_order(creates) {
            out.push(Action::create(resource));
        }
        let mut noop_order: Vec<&Resource> = noops.iter().map(|(r, _)| *r).collect();
        noop_order.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
        for resource in noop_order {
            let (_, hash) = noops.iter().find(|(r, _)| r.fqn == resource.fqn).unwrap();
            out.push(Action::noop(resource, hash.clone()));
        }
        out
    }
}

/// Stable topological sort of `items` by `references`: a resource appears
/// only after every other item in `items` that it references. Ties (no
/// ordering constraint between two ready items) broken by `(kind, name)`.
/// References to resources outside `items` are ignored — a prerequisite
/// that is itself a noop doesn't force reordering.
fn topo_order<'a>(items: Vec<&'a Resource>) -> Vec<&'a Resource> {
    let in_bucket: HashSet<&str> = items.iter().map(|r| r.fqn.as_str()).collect();
    let mut remaining: Vec<&Resource> = items;
    let mut out = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let placed: HashSet<&str> = out.iter().map(|r: &&Resource| r.fqn.as_str()).collect();
        let mut ready: Vec<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, r)| r.references.iter().all(|dep| !in_bucket.contains(dep.as_str()) || placed.contains(dep.as_str())))
            .map(|(i, _)| i)
            .collect();

        if ready.is_empty() {
            // A cycle within this bucket (shouldn't happen for a document
            // that already passed import-cycle detection, but don't hang).
            ready = (0..remaining.len()).collect();
        }

        ready.sort_by(|&a, &b| {
            let (ra, rb) = (remaining[a], remaining[b]);
            (ra.kind, &ra.name).cmp(&(rb.kind, &rb.name))
        });
        let pick = ready[0];
        out.push(remaining.remove(pick));
    }

    out
}

/// Map from FQN to the resource it names, for callers that need to look
/// applied snapshots back up after planning.
#[must_use]
pub fn index_by_fqn(doc: &Document) -> HashMap<&str, &Resource> {
    doc.resources.iter().map(|r| (r.fqn.as_str(), r)).collect()
}
