// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The plugin hook contract: a plugin is a subprocess that
//! declares `{validators[], transforms[], hooks[]}` via a `manifest` call,
//! then answers `validate_{name}`/`transform_{name}`/`hook_{name}` calls
//! over the same newline-delimited JSON-RPC transport the MCP pool uses.
//!
//! Every call is sandboxed at the process boundary: a plugin that traps,
//! hangs past its timeout, or is killed by the OS surfaces as a
//! [`PluginError`] naming the offending plugin, never a host-process
//! failure.

mod host;
mod process;

pub use host::PluginHost;
pub use process::{PluginConfig, PluginManifest, PluginProcess};

/// A plugin call failed in a way that's isolated to that plugin: a trap,
/// a timeout, a crash, or a malformed response. The host continues
/// operating normally.
#[derive(Debug, Clone, thiserror::Error)]
#[error("plugin {name:?} failed: {cause}")]
pub struct PluginError {
    /// The plugin's name.
    pub name: String,
    /// Human-readable cause.
    pub cause: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::PluginConfig;
    use std::time::Duration;

    fn cat_config(name: &str) -> PluginConfig {
        PluginConfig {
            name: name.to_string(),
            command: "cat".to_string(),
            args: vec![],
            env: Default::default(),
            working_dir: None,
            call_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn spawning_a_plugin_that_never_answers_manifest_times_out() {
        let err = PluginProcess::spawn(cat_config("silent")).await.unwrap_err();
        assert!(err.cause.contains("timed out") || err.cause.contains("manifest"));
    }

    #[tokio::test]
    async fn spawning_a_nonexistent_command_reports_a_plugin_error() {
        let cfg = PluginConfig { command: "/definitely/not/a/real/binary".to_string(), ..cat_config("broken") };
        let err = PluginProcess::spawn(cfg).await.unwrap_err();
        assert_eq!(err.name, "broken");
    }

    #[tokio::test]
    async fn empty_host_has_no_validators_to_run() {
        let host = PluginHost::new();
        let errors = host.run_validators(&serde_json::json!({})).await;
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn empty_host_passes_transforms_through_unchanged() {
        let host = PluginHost::new();
        let input = serde_json::json!({"a": 1});
        let output = host.run_transforms(input.clone()).await.unwrap();
        assert_eq!(output, input);
    }
}
