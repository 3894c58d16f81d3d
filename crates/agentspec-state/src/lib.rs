// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The desired-state file store: `{fqn -> StateEntry}` with atomic writes.
//!
//! The state file is the applier's record of what was last successfully (or
//! unsuccessfully) applied, keyed by FQN. Writes are atomic (temp file +
//! rename) so a crash mid-write never leaves a truncated state file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// The schema version stamped on every state file this implementation writes.
pub const STATE_VERSION: u32 = 1;

/// The canonical state filename.
pub const STATE_FILE_NAME: &str = ".agentspec.state.json";

/// The legacy filename migrated on first access.
pub const LEGACY_STATE_FILE_NAME: &str = ".agentz.state.json";

/// The lifecycle status of a previously-applied resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    /// The resource applied successfully.
    Applied,
    /// The resource's last apply attempt failed.
    Failed,
}

/// One entry in the state file, keyed by FQN at the container level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    /// The resource's fully-qualified name.
    pub fqn: String,
    /// The resource's kind, as a source-level identifier string.
    pub kind: String,
    /// The content hash that was (attempted to be) applied.
    pub hash: String,
    /// Whether the apply succeeded.
    pub status: ApplyStatus,
    /// When this entry was last written.
    pub updated_at: DateTime<Utc>,
    /// The error message, if `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The on-disk shape: `{state_version, entries: {fqn -> StateEntry}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFile {
    state_version: u32,
    #[serde(flatten)]
    entries: BTreeMap<String, StateEntry>,
}

/// Errors from state store operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The state file could not be read or written.
    #[error("state I/O error: {0}")]
    Io(#[from] io::Error),
    /// The state file content was not valid JSON in the expected shape.
    #[error("state file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// An in-memory snapshot of the state file, mapping FQN to [`StateEntry`].
#[derive(Debug, Clone, Default)]
pub struct StateMap(pub BTreeMap<String, StateEntry>);

/// The on-disk state store for one working directory.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Open a state store rooted at `dir` (the directory containing the
    /// state file, not the file path itself).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        StateStore { dir: dir.into() }
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE_NAME)
    }

    fn legacy_path(&self) -> PathBuf {
        self.dir.join(LEGACY_STATE_FILE_NAME)
    }

    /// Load the current state snapshot.
    ///
    /// If no canonical state file exists but a legacy `.agentz.state.json`
    /// does, it is renamed into place (not copied) and a notice is logged
    /// before the content is parsed — a one-time, explicit migration rather
    /// than a silent fallback.
    pub fn load(&self) -> Result<StateMap, StateError> {
        let path = self.state_path();
        if !path.exists() {
            let legacy = self.legacy_path();
            if legacy.exists() {
                tracing::info!(
                    target: "agentspec.state",
                    from = %legacy.display(),
                    to = %path.display(),
                    "migrating legacy state file"
                );
                std::fs::rename(&legacy, &path)?;
            } else {
                return Ok(StateMap::default());
            }
        }
        let raw = std::fs::read_to_string(&path)?;
        let file: StateFile = serde_json::from_str(&raw)?;
        Ok(StateMap(file.entries))
    }

    /// Atomically replace the state file with `entries`.
    ///
    /// Writes to a temporary sibling file in the same directory, then
    /// renames over the canonical path — the file is never truncated in
    /// place, so a concurrent reader always sees either the old or the new
    /// content in full.
    pub fn save(&self, entries: &StateMap) -> Result<(), StateError> {
        std::fs::create_dir_all(&self.dir)?;
        let file = StateFile { state_version: STATE_VERSION, entries: entries.0.clone() };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp_path = self.dir.join(format!(".{STATE_FILE_NAME}.tmp"));
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, self.state_path())?;
        Ok(())
    }
}

/// Compare two serialized state files byte-for-byte — the way an idempotent
/// apply is verified: running it twice should produce identical bytes.
pub fn state_files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(std::fs::read(a)? == std::fs::read(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(fqn: &str, hash: &str, status: ApplyStatus) -> StateEntry {
        StateEntry {
            fqn: fqn.to_string(),
            kind: "Agent".to_string(),
            hash: hash.to_string(),
            status,
            updated_at: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn load_on_missing_file_returns_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let loaded = store.load().unwrap();
        assert!(loaded.0.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut map = StateMap::default();
        map.0.insert("pkg/Agent/a".to_string(), entry("pkg/Agent/a", "sha256:abc", ApplyStatus::Applied));
        store.save(&map).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.0.len(), 1);
        assert_eq!(loaded.0["pkg/Agent/a"].hash, "sha256:abc");
    }

    #[test]
    fn save_never_truncates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut map = StateMap::default();
        map.0.insert("pkg/Agent/a".to_string(), entry("pkg/Agent/a", "sha256:v1", ApplyStatus::Applied));
        store.save(&map).unwrap();
        let first_bytes = std::fs::read(store.state_path()).unwrap();

        map.0.insert("pkg/Agent/b".to_string(), entry("pkg/Agent/b", "sha256:v2", ApplyStatus::Applied));
        store.save(&map).unwrap();
        let second_bytes = std::fs::read(store.state_path()).unwrap();

        assert_ne!(first_bytes, second_bytes);
        assert!(!store.dir.join(format!(".{STATE_FILE_NAME}.tmp")).exists());
    }

    #[test]
    fn idempotent_save_produces_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut map = StateMap::default();
        map.0.insert("pkg/Agent/a".to_string(), StateEntry {
            updated_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
            ..entry("pkg/Agent/a", "sha256:v1", ApplyStatus::Applied)
        });
        store.save(&map).unwrap();
        let a = std::fs::read(store.state_path()).unwrap();
        store.save(&map).unwrap();
        let b = std::fs::read(store.state_path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn legacy_file_is_migrated_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join(LEGACY_STATE_FILE_NAME);
        let mut map = BTreeMap::new();
        map.insert("pkg/Agent/a".to_string(), entry("pkg/Agent/a", "sha256:old", ApplyStatus::Applied));
        let file = StateFile { state_version: 1, entries: map };
        std::fs::write(&legacy, serde_json::to_string(&file).unwrap()).unwrap();

        let store = StateStore::new(dir.path());
        let loaded = store.load().unwrap();
        assert_eq!(loaded.0["pkg/Agent/a"].hash, "sha256:old");
        assert!(!legacy.exists());
        assert!(store.state_path().exists());
    }
}
