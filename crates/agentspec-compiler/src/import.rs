// SPDX-License-Identifier: MIT OR Apache-2.0
//! Import merge and cycle detection.
//!
//! The core consumes a *resolved* import map — file path to already-lowered
//! [`Document`] — rather than resolving paths to files itself (that's the
//! collaborator's job). This module merges foreign resources into a root
//! document and detects cycles in the file-level import graph with
//! Tarjan's strongly-connected-components algorithm: any SCC of size > 1
//! is a cycle.

use crate::CompileError;
use agentspec_core::Document;
use std::collections::{BTreeMap, HashMap};

/// Merge `imports` (import path → resolved document) into `root`.
///
/// Foreign resources are appended to `root.resources`; a resource whose FQN
/// already exists in `root` (or in an earlier import, processed in map
/// iteration order) fails with `CompileError::DuplicateFqn`. Policies,
/// bindings, and deploy targets are concatenated the same way. The merged
/// document is re-sorted before being returned.
pub fn merge(mut root: Document, imports: &BTreeMap<String, Document>) -> Result<Document, CompileError> {
    let mut seen: std::collections::HashSet<String> = root.resources.iter().map(|r| r.fqn.clone()).collect();

    for imported in imports.values() {
        for resource in &imported.resources {
            if !seen.insert(resource.fqn.clone()) {
                return Err(CompileError::DuplicateFqn(resource.fqn.clone()));
            }
            root.resources.push(resource.clone());
        }
        root.policies.extend(imported.policies.iter().cloned());
        root.bindings.extend(imported.bindings.iter().cloned());
        root.deploy_targets.extend(imported.deploy_targets.iter().cloned());
    }

    root.sort_resources();
    Ok(root)
}

/// Detect cycles in a file-level import graph given as `(from, to)` edges.
///
/// Runs Tarjan's SCC algorithm; any component with more than one member (or
/// a single node with a self-edge) is a cycle, reported as
/// `CompileError::CircularImport` naming every member in a stable,
/// deterministic chain order.
pub fn detect_cycles(edges: &[(String, String)]) -> Result<(), CompileError> {
    let mut nodes: Vec<String> = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();
    let mut adj: Vec<Vec<usize>> = Vec::new();

    let mut node_index = |name: &str, index_of: &mut HashMap<String, usize>, nodes: &mut Vec<String>, adj: &mut Vec<Vec<usize>>| -> usize {
        if let Some(&i) = index_of.get(name) {
            return i;
        }
        let i = nodes.len();
        nodes.push(name.to_string());
        adj.push(Vec::new());
        index_of.insert(name.to_string(), i);
        i
    };

    for (from, to) in edges {
        let f = node_index(from, &mut index_of, &mut nodes, &mut adj);
        let t = node_index(to, &mut index_of, &mut nodes, &mut adj);
        adj[f].push(t);
    }

    let sccs = tarjan_scc(&adj);
    for scc in sccs {
        let is_cycle = scc.len() > 1 || (scc.len() == 1 && adj[scc[0]].contains(&scc[0]));
        if is_cycle {
            let mut chain: Vec<String> = scc.iter().map(|&i| nodes[i].clone()).collect();
            chain.sort();
            return Err(CompileError::CircularImport(chain));
        }
    }
    Ok(())
}

/// Tarjan's strongly-connected-components algorithm, iterative (an explicit
/// work stack with a per-frame child cursor) to avoid recursion depth
/// limits on large import graphs.
fn tarjan_scc(adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adj.len();
    let mut index: Vec<Option<usize>> = vec![None; n];
    let mut lowlink: Vec<usize> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut result: Vec<Vec<usize>> = Vec::new();

    // Each work-stack frame is (node, next child cursor into adj[node]).
    let mut work: Vec<(usize, usize)> = Vec::new();

    for start in 0..n {
        if index[start].is_some() {
            continue;
        }
        index[start] = Some(next_index);
        lowlink[start] = next_index;
        next_index += 1;
        stack.push(start);
        on_stack[start] = true;
        work.push((start, 0));

        while let Some(&(v, cursor)) = work.last() {
            if cursor < adj[v].len() {
                let w = adj[v][cursor];
                work.last_mut().unwrap().1 += 1;
                if index[w].is_none() {
                    index[w] = Some(next_index);
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    work.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w].unwrap());
                }
            } else {
                work.pop();
                if lowlink[v] == index[v].unwrap() {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    result.push(component);
                }
                if let Some(&(parent, _)) = work.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
            }
        }
    }
    result
}
