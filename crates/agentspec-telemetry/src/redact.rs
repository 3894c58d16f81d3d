// SPDX-License-Identifier: MIT OR Apache-2.0
//! Secret-aware log redaction: any value registered here is replaced by a
//! fixed placeholder in both messages and attribute values before emission.
//!
//! Callers never concatenate a resolved secret into a log string directly —
//! they register it with a `Redactor` once it's resolved, then always pass
//! log output through `Redactor::redact` before it reaches `tracing`.

use std::sync::{Arc, RwLock};

/// The string a registered secret value is replaced by.
pub const REDACTED_PLACEHOLDER: &str = "***REDACTED***";

/// A thread-safe registry of known secret values, used to scrub them out of
/// log text and attribute values.
///
/// Secrets are matched longest-first so that one secret value which is a
/// substring of another doesn't leave a partial value visible.
#[derive(Debug, Clone)]
pub struct Redactor {
    secrets: Arc<RwLock<Vec<String>>>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Redactor {
    /// Create an empty redactor.
    #[must_use]
    pub fn new() -> Self {
        Self { secrets: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Register a secret value to be scrubbed from all future `redact` calls.
    ///
    /// Empty strings are ignored — they would match (and mangle) every
    /// position in any text passed to `redact`.
    pub fn register(&self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        let mut secrets = self.secrets.write().expect("redactor lock poisoned");
        if !secrets.contains(&value) {
            secrets.push(value);
            secrets.sort_unstable_by_key(|b| std::cmp::Reverse(b.len()));
        }
    }

    /// Replace every occurrence of a registered secret value in `text` with
    /// [`REDACTED_PLACEHOLDER`].
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let secrets = self.secrets.read().expect("redactor lock poisoned");
        if secrets.is_empty() {
            return text.to_string();
        }
        let mut out = text.to_string();
        for secret in secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED_PLACEHOLDER);
            }
        }
        out
    }

    /// Number of distinct secret values currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.read().expect("redactor lock poisoned").len()
    }

    /// Whether no secret values are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_text_passes_through_unchanged() {
        let r = Redactor::new();
        assert_eq!(r.redact("hello world"), "hello world");
    }

    #[test]
    fn registered_secret_is_replaced() {
        let r = Redactor::new();
        r.register("sk-live-abc123");
        assert_eq!(r.redact("key is sk-live-abc123 in the request"), format!("key is {REDACTED_PLACEHOLDER} in the request"));
    }

    #[test]
    fn multiple_occurrences_are_all_replaced() {
        let r = Redactor::new();
        r.register("topsecret");
        let redacted = r.redact("topsecret appears twice: topsecret");
        assert_eq!(redacted.matches(REDACTED_PLACEHOLDER).count(), 2);
        assert!(!redacted.contains("topsecret"));
    }

    #[test]
    fn longer_secret_masked_before_shorter_substring() {
        let r = Redactor::new();
        r.register("abc");
        r.register("abcdef");
        let redacted = r.redact("value=abcdef");
        assert_eq!(redacted, format!("value={REDACTED_PLACEHOLDER}"));
    }

    #[test]
    fn empty_secret_is_ignored() {
        let r = Redactor::new();
        r.register("");
        assert!(r.is_empty());
        assert_eq!(r.redact("anything"), "anything");
    }

    #[test]
    fn duplicate_registration_does_not_grow_the_set() {
        let r = Redactor::new();
        r.register("dup");
        r.register("dup");
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn clone_shares_the_underlying_registry() {
        let r = Redactor::new();
        let r2 = r.clone();
        r.register("shared-secret");
        assert_eq!(r2.redact("shared-secret"), REDACTED_PLACEHOLDER);
    }
}
