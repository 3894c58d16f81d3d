// SPDX-License-Identifier: MIT OR Apache-2.0
//! The secret resolver contract: `resolve(reference) -> value`, where
//! `reference` is a scheme-prefixed string such as `env(NAME)` or
//! `vault(path#key)`.
//!
//! The resolver trait is generic over a registered map of scheme to
//! resolver rather than hardcoding just `env`/`vault`, so a deployment can
//! plug in its own secret backend; `env` and `vault` are the two built-ins.
//! Callers are responsible for registering a resolved value with a log
//! redactor before it touches anything that gets logged.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Failures resolving a secret reference.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SecretError {
    /// The reference string wasn't `scheme(body)` shaped.
    #[error("malformed secret reference: {0}")]
    MalformedReference(String),
    /// No resolver is registered for this scheme.
    #[error("unsupported secret scheme: {0}")]
    UnsupportedSecretScheme(String),
    /// The scheme's resolver understood the reference but found nothing.
    #[error("secret not found: {0}")]
    NotFound(String),
    /// An I/O or parse error occurred while resolving.
    #[error("secret resolution error: {0}")]
    Backend(String),
}

/// A backend capable of resolving secret reference bodies for one scheme.
///
/// `resolve` receives the reference body with the `scheme(...)` wrapper
/// already stripped — e.g. for `env(API_KEY)` the `EnvSecretResolver` sees
/// `"API_KEY"`.
pub trait SecretResolver: Send + Sync {
    /// Resolve a reference body to its secret value.
    fn resolve(&self, body: &str) -> Result<String, SecretError>;
}

/// Resolves `env(NAME)` references from the process environment.
#[derive(Debug, Default)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, body: &str) -> Result<String, SecretError> {
        std::env::var(body).map_err(|_| SecretError::NotFound(format!("env({body})")))
    }
}

/// Resolves `vault(path#key)` references against flat JSON files rooted at
/// a configured directory — `path` is a file relative to that root, `key`
/// is a top-level string field in that file.
#[derive(Debug, Clone)]
pub struct VaultSecretResolver {
    root: PathBuf,
}

impl VaultSecretResolver {
    /// Build a resolver rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SecretResolver for VaultSecretResolver {
    fn resolve(&self, body: &str) -> Result<String, SecretError> {
        let (path, key) = body
            .split_once('#')
            .ok_or_else(|| SecretError::MalformedReference(format!("vault({body})")))?;
        let file = self.root.join(path);
        let content = std::fs::read_to_string(&file)
            .map_err(|e| SecretError::Backend(format!("reading {}: {e}", file.display())))?;
        let parsed: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| SecretError::Backend(format!("parsing {}: {e}", file.display())))?;
        parsed
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| SecretError::NotFound(format!("vault({body})")))
    }
}

/// A registry of secret resolvers keyed by scheme, and the entry point for
/// resolving a full `scheme(body)` reference string.
pub struct SecretRegistry {
    resolvers: BTreeMap<String, Box<dyn SecretResolver>>,
}

impl Default for SecretRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretRegistry {
    /// An empty registry with no resolvers.
    #[must_use]
    pub fn new() -> Self {
        Self { resolvers: BTreeMap::new() }
    }

    /// A registry with `env` and `vault` pre-registered; `vault_root` is
    /// the directory `vault(path#key)` references resolve paths against.
    #[must_use]
    pub fn with_builtins(vault_root: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register("env", Box::new(EnvSecretResolver));
        registry.register("vault", Box::new(VaultSecretResolver::new(vault_root)));
        registry
    }

    /// Register (or replace) the resolver for a scheme.
    pub fn register(&mut self, scheme: impl Into<String>, resolver: Box<dyn SecretResolver>) {
        self.resolvers.insert(scheme.into(), resolver);
    }

    /// Resolve a full reference, e.g. `"env(API_KEY)"` or
    /// `"vault(creds.json#token)"`.
    pub fn resolve(&self, reference: &str) -> Result<String, SecretError> {
        let open = reference
            .find('(')
            .ok_or_else(|| SecretError::MalformedReference(reference.to_string()))?;
        let scheme = &reference[..open];
        let body = reference
            .strip_prefix(scheme)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| SecretError::MalformedReference(reference.to_string()))?;

        match self.resolvers.get(scheme) {
            Some(resolver) => resolver.resolve(body),
            None => Err(SecretError::UnsupportedSecretScheme(scheme.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn env_scheme_resolves_from_process_environment() {
        unsafe { std::env::set_var("AGENTSPEC_SECRET_TEST_VAR", "hunter2") };
        let registry = SecretRegistry::with_builtins("/nonexistent");
        assert_eq!(
            registry.resolve("env(AGENTSPEC_SECRET_TEST_VAR)").unwrap(),
            "hunter2"
        );
        unsafe { std::env::remove_var("AGENTSPEC_SECRET_TEST_VAR") };
    }

    #[test]
    fn missing_env_var_is_not_found() {
        let registry = SecretRegistry::with_builtins("/nonexistent");
        let err = registry.resolve("env(DEFINITELY_NOT_SET_XYZ)").unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let registry = SecretRegistry::with_builtins("/nonexistent");
        let err = registry.resolve("kms(key-id)").unwrap_err();
        assert!(matches!(err, SecretError::UnsupportedSecretScheme(s) if s == "kms"));
    }

    #[test]
    fn malformed_reference_is_rejected() {
        let registry = SecretRegistry::with_builtins("/nonexistent");
        let err = registry.resolve("not-a-reference").unwrap_err();
        assert!(matches!(err, SecretError::MalformedReference(_)));
    }

    #[test]
    fn vault_scheme_reads_key_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("creds.json")).unwrap();
        writeln!(f, r#"{{"token": "abc123"}}"#).unwrap();
        let registry = SecretRegistry::with_builtins(dir.path());
        assert_eq!(registry.resolve("vault(creds.json#token)").unwrap(), "abc123");
    }

    #[test]
    fn vault_scheme_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("creds.json")).unwrap();
        writeln!(f, r#"{{"token": "abc123"}}"#).unwrap();
        let registry = SecretRegistry::with_builtins(dir.path());
        let err = registry.resolve("vault(creds.json#missing)").unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[test]
    fn vault_scheme_malformed_body_without_hash_is_rejected() {
        let registry = SecretRegistry::with_builtins("/nonexistent");
        let err = registry.resolve("vault(creds.json)").unwrap_err();
        assert!(matches!(err, SecretError::MalformedReference(_)));
    }

    #[test]
    fn custom_resolver_can_be_registered() {
        struct Fixed(&'static str);
        impl SecretResolver for Fixed {
            fn resolve(&self, _body: &str) -> Result<String, SecretError> {
                Ok(self.0.to_string())
            }
        }
        let mut registry = SecretRegistry::new();
        registry.register("fixed", Box::new(Fixed("always-this")));
        assert_eq!(registry.resolve("fixed(anything)").unwrap(), "always-this");
    }
}
