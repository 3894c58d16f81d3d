// SPDX-License-Identifier: MIT OR Apache-2.0
//! Invocation receipt persistence and retrieval.

use crate::invocation::InvocationReceipt;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

/// Result of verifying the stored receipt chain.
#[derive(Debug, Clone)]
pub struct ChainVerification {
    /// Number of receipts with valid hashes.
    pub valid_count: usize,
    /// Run IDs of receipts whose hash did not match.
    pub invalid_hashes: Vec<Uuid>,
    /// Time gaps between consecutive runs' completion timestamps.
    pub gaps: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    /// `true` when every receipt hash is valid.
    pub is_valid: bool,
}

/// File-based invocation receipt store.
#[derive(Debug)]
pub struct InvocationStore {
    root: PathBuf,
}

impl InvocationStore {
    /// Create a new store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist a receipt to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file cannot be written.
    pub fn save(&self, receipt: &InvocationReceipt) -> Result<PathBuf> {
        let path = self.receipt_path(receipt.run_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create receipt dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(receipt)?;
        std::fs::write(&path, json).with_context(|| format!("write receipt to {}", path.display()))?;
        Ok(path)
    }

    /// Load a receipt by `run_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(&self, run_id: Uuid) -> Result<InvocationReceipt> {
        let path = self.receipt_path(run_id);
        let json = std::fs::read_to_string(&path).with_context(|| format!("read receipt from {}", path.display()))?;
        let receipt: InvocationReceipt = serde_json::from_str(&json)?;
        Ok(receipt)
    }

    /// List all stored receipt run_ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directory cannot be read.
    pub fn list(&self) -> Result<Vec<Uuid>> {
        let dir = match std::fs::read_dir(&self.root) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(anyhow::Error::new(e).context(format!("read receipt dir {}", self.root.display()))),
        };
        let mut ids = Vec::new();
        for entry in dir {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Verify a receipt's hash matches its stored content.
    ///
    /// # Errors
    ///
    /// Returns an error if the receipt cannot be loaded.
    pub fn verify(&self, run_id: Uuid) -> Result<bool> {
        let receipt = self.load(run_id)?;
        Ok(receipt.is_hash_valid())
    }

    /// Verify that all stored receipts have valid hashes, and report the
    /// time gaps between consecutive completions.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directory cannot be read or a receipt
    /// cannot be loaded.
    pub fn verify_chain(&self) -> Result<ChainVerification> {
        let ids = self.list()?;
        if ids.is_empty() {
            return Ok(ChainVerification { valid_count: 0, invalid_hashes: Vec::new(), gaps: Vec::new(), is_valid: true });
        }

        let mut receipts: Vec<InvocationReceipt> = ids.iter().map(|id| self.load(*id)).collect::<Result<Vec<_>>>()?;
        receipts.sort_by_key(|r| r.finished_at);

        let mut valid_count: usize = 0;
        let mut invalid_hashes: Vec<Uuid> = Vec::new();
        for r in &receipts {
            if r.is_hash_valid() {
                valid_count += 1;
            } else {
                invalid_hashes.push(r.run_id);
            }
        }

        let mut gaps: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::new();
        for pair in receipts.windows(2) {
            gaps.push((pair[0].finished_at, pair[1].finished_at));
        }

        let is_valid = invalid_hashes.is_empty();
        Ok(ChainVerification { valid_count, invalid_hashes, gaps, is_valid })
    }

    fn receipt_path(&self, run_id: Uuid) -> PathBuf {
        self.root.join(format!("{run_id}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Outcome;

    fn receipt(run_id: Uuid) -> InvocationReceipt {
        InvocationReceipt::new(run_id, "myapp/Agent/a", Outcome::Success, 1, 10, 0.0, 5, Utc::now())
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = InvocationStore::new(dir.path());
        let r = receipt(Uuid::new_v4());
        store.save(&r).unwrap();
        let loaded = store.load(r.run_id).unwrap();
        assert_eq!(loaded.run_id, r.run_id);
    }

    #[test]
    fn verify_detects_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = InvocationStore::new(dir.path());
        let r = receipt(Uuid::new_v4());
        let path = store.save(&r).unwrap();
        let mut tampered = r.clone();
        tampered.tokens_used = 0;
        tampered.outcome = Outcome::Failed;
        std::fs::write(&path, serde_json::to_string_pretty(&tampered).unwrap()).unwrap();
        assert!(!store.verify(r.run_id).unwrap());
    }

    #[test]
    fn list_on_missing_directory_returns_empty() {
        let store = InvocationStore::new("/nonexistent/path/does/not/exist");
        assert!(store.list().unwrap().is_empty());
    }
}
