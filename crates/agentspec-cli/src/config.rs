// SPDX-License-Identifier: MIT OR Apache-2.0
//! CLI-facing wrapper around [`agentspec_config`]: loads a [`RuntimeConfig`]
//! and turns its errors/warnings into the plain diagnostic strings the
//! `config check` subcommand prints.

use agentspec_config::{load_config, validate_config, RuntimeConfig};
use std::path::Path;

/// Load and validate a [`RuntimeConfig`] from an optional TOML path,
/// returning one diagnostic line per error or warning found.
///
/// A missing/unreadable file or a parse failure short-circuits with a
/// single `"error: ..."` line; a file that parses but fails semantic
/// validation reports every validation error; a config with no errors
/// reports its warnings (if any) plus a trailing `"config: ok"`.
pub fn config_check(path: Option<&Path>) -> Vec<String> {
    let config = match load_config(path) {
        Ok(c) => c,
        Err(e) => return vec![format!("error: {e}")],
    };

    match validate_config(&config) {
        Ok(warnings) => {
            let mut diagnostics: Vec<String> = warnings.iter().map(|w| format!("warning: {w}")).collect();
            diagnostics.push("config: ok".to_string());
            diagnostics
        }
        Err(e) => vec![format!("error: {e}")],
    }
}

/// Load a [`RuntimeConfig`], applying environment overrides, for commands
/// that need the config itself rather than just its diagnostics.
pub fn load_effective_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    let mut config = load_config(path)?;
    agentspec_config::apply_env_overrides(&mut config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_check_defaults_reports_warnings_then_ok() {
        let diags = config_check(None);
        assert!(diags.last().map(String::as_str) == Some("config: ok"));
    }

    #[test]
    fn config_check_bad_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [toml =").unwrap();
        let diags = config_check(Some(&path));
        assert!(diags.iter().any(|d| d.starts_with("error:")));
    }

    #[test]
    fn load_effective_config_applies_env_overrides() {
        unsafe { std::env::set_var("AGENTSPEC_BIND_ADDR", "127.0.0.1:4321") };
        let config = load_effective_config(None).unwrap();
        assert_eq!(config.bind_addr.as_deref(), Some("127.0.0.1:4321"));
        unsafe { std::env::remove_var("AGENTSPEC_BIND_ADDR") };
    }
}
