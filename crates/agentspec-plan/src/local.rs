// SPDX-License-Identifier: MIT OR Apache-2.0
//! A file-based [`Adapter`]: the built-in deployment target for local
//! development and the CLI's own test suite. Applying a resource writes its
//! canonical JSON snapshot into `root/{kind}/{name}.json`; the artifact
//! reference returned is that file's path. There is no external system to
//! fail against, so `apply` only ever reports [`ApplyOutcome::Failed`] for
//! an I/O error writing the snapshot itself.

use crate::action::{Action, ActionType};
use crate::adapter::{Adapter, AdapterError, ApplyResult, LogOptions, ResourceStatus};
use agentspec_core::Resource;
use agentspec_runtime::cancel::CancellationToken;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Applies resources by writing their canonical JSON to files under a root
/// directory, keyed by FQN. Useful as the default `deploy_targets[].target
/// == "local"` adapter and as a fixture for exercising `Planner`/`Applier`
/// end to end without a real external system.
pub struct LocalAdapter {
    root: PathBuf,
    applied: Mutex<BTreeMap<String, Resource>>,
}

impl LocalAdapter {
    /// Build an adapter rooted at `root`. The directory is created lazily,
    /// on first `apply`/`export`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalAdapter { root: root.into(), applied: Mutex::new(BTreeMap::new()) }
    }

    fn snapshot_path(&self, resource: &Resource) -> PathBuf {
        self.root.join(resource.kind.as_str()).join(format!("{}.json", resource.name))
    }
}

#[async_trait]
impl Adapter for LocalAdapter {
    fn name(&self) -> &str {
        "local"
    }

    async fn validate(&self, _cancel: &CancellationToken, _resources: &[Resource]) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn apply(&self, cancel: &CancellationToken, action: &Action) -> Result<ApplyResult, AdapterError> {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        match action.action_type {
            ActionType::Delete => {
                if let Some(resource) = self.applied.lock().expect("local adapter lock poisoned").remove(&action.fqn) {
                    let path = self.snapshot_path(&resource);
                    if path.exists() {
                        std::fs::remove_file(&path)?;
                    }
                }
                Ok(ApplyResult::success(&action.fqn, action.action_type, None))
            }
            ActionType::Noop => Ok(ApplyResult::success(&action.fqn, action.action_type, None)),
            ActionType::Create | ActionType::Update => {
                let Some(resource) = &action.resource_snapshot else {
                    return Ok(ApplyResult::failed(&action.fqn, action.action_type, "no resource snapshot to apply"));
                };
                let path = self.snapshot_path(resource);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let json = serde_json::to_string_pretty(resource)
                    .map_err(|e| AdapterError::Internal(format!("serialize resource: {e}")))?;
                std::fs::write(&path, json)?;
                self.applied.lock().expect("local adapter lock poisoned").insert(action.fqn.clone(), resource.clone());
                Ok(ApplyResult::success(&action.fqn, action.action_type, Some(path.display().to_string())))
            }
        }
    }

    async fn export(&self, cancel: &CancellationToken, resources: &[Resource], out_dir: &Path) -> Result<(), AdapterError> {
        std::fs::create_dir_all(out_dir)?;
        for resource in resources {
            if cancel.is_cancelled() {
                return Err(AdapterError::Cancelled);
            }
            let path = out_dir.join(resource.kind.as_str()).join(format!("{}.json", resource.name));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(resource)
                .map_err(|e| AdapterError::Internal(format!("serialize resource: {e}")))?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    async fn status(&self, _cancel: &CancellationToken) -> Result<Vec<ResourceStatus>, AdapterError> {
        let applied = self.applied.lock().expect("local adapter lock poisoned");
        Ok(applied
            .values()
            .map(|r| ResourceStatus { fqn: r.fqn.clone(), state: "applied".to_string(), hash: Some(r.hash.clone()) })
            .collect())
    }

    async fn logs(&self, _cancel: &CancellationToken, writer: &mut (dyn Write + Send), opts: &LogOptions) -> Result<(), AdapterError> {
        let applied = self.applied.lock().expect("local adapter lock poisoned");
        for resource in applied.values() {
            if let Some(fqn) = &opts.fqn {
                if fqn != &resource.fqn {
                    continue;
                }
            }
            writeln!(writer, "{}: applied (hash={})", resource.fqn, resource.hash)?;
        }
        Ok(())
    }

    async fn destroy(&self, cancel: &CancellationToken) -> Result<Vec<ApplyResult>, AdapterError> {
        let fqns: Vec<String> = self.applied.lock().expect("local adapter lock poisoned").keys().cloned().collect();
        let mut results = Vec::with_capacity(fqns.len());
        for fqn in fqns {
            if cancel.is_cancelled() {
                return Err(AdapterError::Cancelled);
            }
            let resource = self.applied.lock().expect("local adapter lock poisoned").remove(&fqn);
            if let Some(resource) = resource {
                let path = self.snapshot_path(&resource);
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                results.push(ApplyResult::success(&fqn, ActionType::Delete, None));
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action as PlanAction;
    use crate::adapter::ApplyOutcome;
    use agentspec_core::{ResourceKind, Value};

    fn resource(name: &str) -> Resource {
        Resource::new("pkg", ResourceKind::Prompt, name, Value::Map(Default::default()), vec![])
    }

    #[tokio::test]
    async fn apply_create_writes_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());
        let cancel = CancellationToken::new();
        let r = resource("p1");
        let action = PlanAction::create(&r);
        let result = adapter.apply(&cancel, &action).await.unwrap();
        assert_eq!(result.status, ApplyOutcome::Success);
        let artifact = result.artifact.unwrap();
        assert!(Path::new(&artifact).exists());
    }

    #[tokio::test]
    async fn apply_delete_removes_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());
        let cancel = CancellationToken::new();
        let r = resource("p1");
        adapter.apply(&cancel, &PlanAction::create(&r)).await.unwrap();
        let path = adapter.snapshot_path(&r);
        assert!(path.exists());

        let delete = PlanAction::delete(&r.fqn, r.kind, r.hash.clone());
        let result = adapter.apply(&cancel, &delete).await.unwrap();
        assert_eq!(result.status, ApplyOutcome::Success);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn status_reports_applied_resources() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());
        let cancel = CancellationToken::new();
        let r = resource("p1");
        adapter.apply(&cancel, &PlanAction::create(&r)).await.unwrap();
        let statuses = adapter.status(&cancel).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].fqn, r.fqn);
    }

    #[tokio::test]
    async fn export_writes_every_resource_without_touching_applied_state() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());
        let cancel = CancellationToken::new();
        let r = resource("p1");
        adapter.export(&cancel, &[r.clone()], out.path()).await.unwrap();
        assert!(out.path().join("Prompt").join("p1.json").exists());
        assert!(adapter.status(&cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn destroy_removes_all_applied_resources() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());
        let cancel = CancellationToken::new();
        adapter.apply(&cancel, &PlanAction::create(&resource("a"))).await.unwrap();
        adapter.apply(&cancel, &PlanAction::create(&resource("b"))).await.unwrap();
        let results = adapter.destroy(&cancel).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(adapter.status(&cancel).await.unwrap().is_empty());
    }
}
