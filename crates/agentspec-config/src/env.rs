// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment variable resolution: a case-folding lookup, not a config-file
//! parser — this is a runtime concern, not a compile concern.

const DEFAULT_PREFIX: &str = "AGENTSPEC";

/// Look up `AGENTSPEC_<AGENT>_<PARAM>` (when `agent_fqn` is given) falling
/// back to `AGENTSPEC_<PARAM>`.
///
/// `agent_fqn` and `param` are case-folded: uppercased, with any character
/// that isn't `[A-Za-z0-9]` replaced by `_`. So `agent_fqn = "acme/agent/bot"`,
/// `param = "api-key"` checks `AGENTSPEC_ACME_AGENT_BOT_API_KEY` first.
#[must_use]
pub fn env_override(agent_fqn: Option<&str>, param: &str) -> Option<String> {
    env_override_with_prefix(DEFAULT_PREFIX, agent_fqn, param)
}

/// As [`env_override`], but with a caller-supplied prefix instead of
/// `AGENTSPEC`.
#[must_use]
pub fn env_override_with_prefix(prefix: &str, agent_fqn: Option<&str>, param: &str) -> Option<String> {
    let folded_param = fold(param);
    if let Some(fqn) = agent_fqn {
        let scoped = format!("{prefix}_{}_{folded_param}", fold(fqn));
        if let Ok(val) = std::env::var(&scoped) {
            return Some(val);
        }
    }
    let bare = format!("{prefix}_{folded_param}");
    std::env::var(&bare).ok()
}

fn fold(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_replaces_non_alphanumerics() {
        assert_eq!(fold("acme/agent/bot"), "ACME_AGENT_BOT");
        assert_eq!(fold("api-key"), "API_KEY");
    }

    #[test]
    fn bare_variable_is_read_when_no_agent_scope_is_set() {
        // SAFETY: test-only env var, unique name avoids cross-test interference.
        unsafe { std::env::set_var("AGENTSPEC_TEST_BARE_PARAM", "plain") };
        assert_eq!(env_override(None, "TEST_BARE_PARAM"), Some("plain".into()));
        unsafe { std::env::remove_var("AGENTSPEC_TEST_BARE_PARAM") };
    }

    #[test]
    fn agent_scoped_variable_takes_priority_over_bare() {
        unsafe {
            std::env::set_var("AGENTSPEC_TEST_SCOPE_PARAM", "bare");
            std::env::set_var("AGENTSPEC_MY_AGENT_TEST_SCOPE_PARAM", "scoped");
        }
        assert_eq!(
            env_override(Some("my/agent"), "TEST_SCOPE_PARAM"),
            Some("scoped".into())
        );
        unsafe {
            std::env::remove_var("AGENTSPEC_TEST_SCOPE_PARAM");
            std::env::remove_var("AGENTSPEC_MY_AGENT_TEST_SCOPE_PARAM");
        }
    }

    #[test]
    fn missing_variable_returns_none() {
        assert_eq!(env_override(None, "DOES_NOT_EXIST_ANYWHERE"), None);
    }

    #[test]
    fn custom_prefix_is_honored() {
        unsafe { std::env::set_var("MYAPP_TEST_CUSTOM_PREFIX", "x") };
        assert_eq!(
            env_override_with_prefix("MYAPP", None, "TEST_CUSTOM_PREFIX"),
            Some("x".into())
        );
        unsafe { std::env::remove_var("MYAPP_TEST_CUSTOM_PREFIX") };
    }
}
