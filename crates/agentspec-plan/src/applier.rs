// SPDX-License-Identifier: MIT OR Apache-2.0
//! Drives a plan's actions through an [`Adapter`], updating the desired
//! state file as it goes.

use crate::action::{Action, ActionType};
use crate::adapter::{Adapter, AdapterError, ApplyOutcome, ApplyResult};
use agentspec_runtime::cancel::CancellationToken;
use agentspec_state::{ApplyStatus, StateEntry, StateMap, StateStore};
use chrono::Utc;
use std::collections::{HashMap, HashSet};

/// Drives an [`Adapter`] over a plan's actions, one at a time in plan
/// order, with mark-and-continue failure semantics: a failed action does
/// not abort the run, but every action that (directly or transitively)
/// depends on a failed resource's snapshot is skipped rather than
/// attempted.
pub struct Applier<'a> {
    adapter: &'a dyn Adapter,
}

impl<'a> Applier<'a> {
    /// Build an applier that drives `adapter`.
    #[must_use]
    pub fn new(adapter: &'a dyn Adapter) -> Self {
        Applier { adapter }
    }

    /// Apply `actions` in order, persisting the resulting state to `store`
    /// after every action so a crash mid-run loses at most the
    /// in-flight action.
    pub async fn apply(
        &self,
        cancel: &CancellationToken,
        actions: &[Action],
        mut state: StateMap,
        store: &StateStore,
    ) -> Result<Vec<ApplyResult>, AdapterError> {
        let mut results = Vec::with_capacity(actions.len());
        let mut failed: HashSet<String> = HashSet::new();

        for action in actions {
            if cancel.is_cancelled() {
                results.push(ApplyResult::skipped(&action.fqn, action.action_type, "run cancelled"));
                continue;
            }

            let blocked_on = action
                .resource_snapshot
                .as_ref()
                .map(|r| r.references.iter().find(|dep| failed.contains(dep.as_str())).cloned())
                .unwrap_or(None);

            if let Some(dep) = blocked_on {
                let result = ApplyResult::skipped(&action.fqn, action.action_type, format!("prerequisite {dep} failed"));
                failed.insert(action.fqn.clone());
                results.push(result);
                continue;
            }

            if action.action_type == ActionType::Noop {
                results.push(ApplyResult::success(&action.fqn, ActionType::Noop, None));
                continue;
            }

            let result = self.adapter.apply(cancel, action).await?;
            if result.status == ApplyOutcome::Failed {
                failed.insert(action.fqn.clone());
            }
            self.record(&mut state, action, &result);
            store.save(&state).map_err(|e| AdapterError::Internal(e.to_string()))?;
            results.push(result);
        }

        Ok(results)
    }

    fn record(&self, state: &mut StateMap, action: &Action, result: &ApplyResult) {
        match action.action_type {
            ActionType::Delete => {
                if result.status == ApplyOutcome::Success {
                    state.0.remove(&action.fqn);
                }
            }
            ActionType::Create | ActionType::Update => {
                let Some(resource) = &action.resource_snapshot else { return };
                let status = if result.status == ApplyOutcome::Success { ApplyStatus::Applied } else { ApplyStatus::Failed };
                state.0.insert(
                    action.fqn.clone(),
                    StateEntry {
                        fqn: action.fqn.clone(),
                        kind: resource.kind.as_str().to_string(),
                        hash: resource.hash.clone(),
                        status,
                        updated_at: Utc::now(),
                        error: result.error.clone(),
                    },
                );
            }
            ActionType::Noop => {}
        }
    }
}

/// Map an adapter's [`ResourceStatus`] report into a FQN-keyed lookup, as a
/// convenience for CLI/server status rendering.
#[must_use]
pub fn index_statuses(statuses: &[crate::adapter::ResourceStatus]) -> HashMap<&str, &crate::adapter::ResourceStatus> {
    statuses.iter().map(|s| (s.fqn.as_str(), s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action as PlanAction;
    use crate::adapter::{LogOptions, ResourceStatus};
    use crate::planner::Planner;
    use agentspec_core::{Document, PackageInfo, Resource, ResourceKind, Value};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeAdapter {
        fail: HashSet<String>,
        calls: AsyncMutex<Vec<String>>,
        saved_calls: Mutex<Vec<String>>,
    }

    impl FakeAdapter {
        fn new(fail: &[&str]) -> Self {
            FakeAdapter { fail: fail.iter().map(|s| s.to_string()).collect(), calls: AsyncMutex::new(Vec::new()), saved_calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Adapter for FakeAdapter {
        fn name(&self) -> &str {
            "fake"
        }

        async fn validate(&self, _cancel: &CancellationToken, _resources: &[Resource]) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn apply(&self, _cancel: &CancellationToken, action: &PlanAction) -> Result<ApplyResult, AdapterError> {
            self.calls.lock().await.push(action.fqn.clone());
            self.saved_calls.lock().unwrap().push(action.fqn.clone());
            if self.fail.contains(&action.fqn) {
                Ok(ApplyResult::failed(&action.fqn, action.action_type, "boom"))
            } else {
                Ok(ApplyResult::success(&action.fqn, action.action_type, None))
            }
        }

        async fn export(&self, _cancel: &CancellationToken, _resources: &[Resource], _out_dir: &Path) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn status(&self, _cancel: &CancellationToken) -> Result<Vec<ResourceStatus>, AdapterError> {
            Ok(vec![])
        }

        async fn logs(&self, _cancel: &CancellationToken, _writer: &mut (dyn std::io::Write + Send), _opts: &LogOptions) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn destroy(&self, _cancel: &CancellationToken) -> Result<Vec<ApplyResult>, AdapterError> {
            Ok(vec![])
        }
    }

    fn doc_with(resources: Vec<Resource>) -> Document {
        Document {
            ir_version: "1.0".to_string(),
            lang_version: "1.0".to_string(),
            package: PackageInfo { name: "pkg".into(), version: "0.1.0".into(), description: None },
            resources,
            policies: vec![],
            bindings: vec![],
            deploy_targets: vec![],
        }
    }

    #[tokio::test]
    async fn s1_apply_creates_then_noops_with_identical_state_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let p1 = Resource::new("pkg", ResourceKind::Prompt, "p1", Value::Map(Default::default()), vec![]);
        let hello = Resource::new("pkg", ResourceKind::Agent, "hello", Value::Map(Default::default()), vec![p1.fqn.clone()]);
        let doc = doc_with(vec![hello.clone(), p1.clone()]);

        let adapter = FakeAdapter::new(&[]);
        let cancel = CancellationToken::new();

        let plan1 = Planner::plan(&doc, &StateMap::default());
        let applier = Applier::new(&adapter);
        let results1 = applier.apply(&cancel, &plan1, StateMap::default(), &store).await.unwrap();
        assert_eq!(results1.len(), 2);
        assert!(results1.iter().all(|r| r.status == ApplyOutcome::Success));

        let first_bytes = std::fs::read(dir.path().join(".agentspec.state.json")).unwrap();

        let state2 = store.load().unwrap();
        let plan2 = Planner::plan(&doc, &state2);
        assert!(plan2.iter().all(|a| a.action_type == ActionType::Noop));
        let state_before_second_apply = store.load().unwrap();
        let _results2 = applier.apply(&cancel, &plan2, state_before_second_apply, &store).await.unwrap();

        let second_bytes = std::fs::read(dir.path().join(".agentspec.state.json")).unwrap();
        assert_eq!(first_bytes, second_bytes);
    }

    #[tokio::test]
    async fn failed_prerequisite_skips_dependent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let p1 = Resource::new("pkg", ResourceKind::Prompt, "p1", Value::Map(Default::default()), vec![]);
        let hello = Resource::new("pkg", ResourceKind::Agent, "hello", Value::Map(Default::default()), vec![p1.fqn.clone()]);
        let doc = doc_with(vec![hello, p1.clone()]);

        let adapter = FakeAdapter::new(&[p1.fqn.as_str()]);
        let cancel = CancellationToken::new();
        let plan = Planner::plan(&doc, &StateMap::default());
        let applier = Applier::new(&adapter);
        let results = applier.apply(&cancel, &plan, StateMap::default(), &store).await.unwrap();

        let p1_result = results.iter().find(|r| r.fqn == p1.fqn).unwrap();
        assert_eq!(p1_result.status, ApplyOutcome::Failed);
        let hello_result = results.iter().find(|r| r.fqn.ends_with("hello")).unwrap();
        assert_eq!(hello_result.status, ApplyOutcome::Skipped);
    }

    #[tokio::test]
    async fn delete_removes_state_entry_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let p1 = Resource::new("pkg", ResourceKind::Prompt, "p1", Value::Map(Default::default()), vec![]);
        let mut state = StateMap::default();
        state.0.insert(
            p1.fqn.clone(),
            StateEntry { fqn: p1.fqn.clone(), kind: "Prompt".to_string(), hash: p1.hash.clone(), status: ApplyStatus::Applied, updated_at: Utc::now(), error: None },
        );
        store.save(&state).unwrap();

        let doc = doc_with(vec![]);
        let adapter = FakeAdapter::new(&[]);
        let cancel = CancellationToken::new();
        let plan = Planner::plan(&doc, &state);
        let applier = Applier::new(&adapter);
        applier.apply(&cancel, &plan, state, &store).await.unwrap();

        let reloaded = store.load().unwrap();
        assert!(reloaded.0.is_empty());
    }
}
