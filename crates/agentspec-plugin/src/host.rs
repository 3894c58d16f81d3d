// SPDX-License-Identifier: MIT OR Apache-2.0
//! Aggregates a set of loaded plugins and runs validators/transforms/hooks
//! across all of them per the declared invocation contract.

use crate::process::PluginProcess;
use crate::PluginError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A registered set of plugin subprocesses, keyed by name.
#[derive(Default)]
pub struct PluginHost {
    plugins: BTreeMap<String, Arc<PluginProcess>>,
}

impl PluginHost {
    /// An empty host with no plugins registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-spawned plugin under its own name.
    pub fn register(&mut self, plugin: Arc<PluginProcess>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    /// Every registered plugin's name, in registration order.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Run every declared validator against `resource`, across every
    /// registered plugin, accumulating error strings. A plugin whose
    /// validator call itself fails (trap, timeout, crash) contributes one
    /// synthetic error naming the plugin rather than aborting the whole
    /// validation pass — one misbehaving plugin can't block every other
    /// plugin's validators from running.
    pub async fn run_validators(&self, resource: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        for plugin in self.plugins.values() {
            for validator_name in &plugin.manifest().validators {
                match plugin.validate(validator_name, resource.clone()).await {
                    Ok(mut found) => errors.append(&mut found),
                    Err(e) => errors.push(format!("plugin {:?} validator {validator_name:?}: {e}", plugin.name())),
                }
            }
        }
        errors
    }

    /// Apply every declared transform to `resource`, in manifest order
    /// within a plugin and registration order across plugins. Stops and
    /// returns the first transform failure — unlike validators, transforms
    /// feed each other's output, so one failing mid-chain leaves the
    /// result undefined if execution continued.
    pub async fn run_transforms(&self, mut resource: Value) -> Result<Value, PluginError> {
        for plugin in self.plugins.values() {
            for transform_name in &plugin.manifest().transforms {
                resource = plugin.transform(transform_name, resource).await?;
            }
        }
        Ok(resource)
    }

    /// Invoke `hook_{hook_name}` on every plugin that declares it,
    /// collecting each plugin's outcome independently — one plugin's
    /// failure doesn't suppress another's response.
    pub async fn run_hook(&self, hook_name: &str, context: &Value) -> Vec<(String, Result<Option<Value>, PluginError>)> {
        let mut out = Vec::new();
        for plugin in self.plugins.values() {
            if plugin.manifest().hooks.iter().any(|h| h == hook_name) {
                let result = plugin.hook(hook_name, context.clone()).await;
                out.push((plugin.name().to_string(), result));
            }
        }
        out
    }

    /// Close every registered plugin's subprocess, allowing `grace` each.
    pub async fn shutdown(&self, grace: Duration) {
        for plugin in self.plugins.values() {
            plugin.close(grace).await;
        }
    }
}
