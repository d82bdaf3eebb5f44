//! Whole-document JSON ledger persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{SyncError, SyncResult};

use super::entry::CacheEntry;

/// In-memory cache ledger: filename -> entry.
///
/// The field name matches the original `cache.json` document
/// (`{"mods": {...}}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Cache {
    pub mods: BTreeMap<String, CacheEntry>,
}

impl Cache {
    /// Look up the entry for a filename.
    pub fn get(&self, filename: &str) -> Option<&CacheEntry> {
        self.mods.get(filename)
    }

    /// Insert or replace the entry for a filename.
    pub fn insert(&mut self, filename: impl Into<String>, entry: CacheEntry) {
        self.mods.insert(filename.into(), entry);
    }

    /// Remove the entry for a filename, returning it if present.
    ///
    /// Used by the reinstall flow to force an unconditional re-download
    /// from the evicted entry's source URL.
    pub fn evict(&mut self, filename: &str) -> Option<CacheEntry> {
        self.mods.remove(filename)
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.mods.len()
    }

    /// Whether the ledger tracks no files.
    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
}

/// Persistence for the cache ledger.
///
/// `save` overwrites the entire document; callers load-mutate-save
/// under their own sequencing. There is no partial merge and no
/// cross-process locking.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// Create a store backed by the given ledger path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The ledger path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger, returning an empty one if the document does not
    /// exist yet.
    pub fn load(&self) -> SyncResult<Cache> {
        if !self.path.exists() {
            return Ok(Cache::default());
        }

        let raw = fs::read_to_string(&self.path).map_err(|e| SyncError::ReadFailed {
            path: self.path.clone(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            SyncError::Config(format!("malformed ledger {}: {}", self.path.display(), e))
        })
    }

    /// Persist the ledger, overwriting the whole document.
    pub fn save(&self, cache: &Cache) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::CacheStoreWrite {
                path: self.path.clone(),
                source: e,
            })?;
        }

        let raw = serde_json::to_string_pretty(cache)
            .map_err(|e| SyncError::Config(format!("serialize ledger: {}", e)))?;
        fs::write(&self.path, raw).map_err(|e| SyncError::CacheStoreWrite {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Persist the ledger, logging instead of failing.
    ///
    /// A failed ledger write must never abort a download that otherwise
    /// succeeded; the in-memory ledger keeps serving the rest of the run.
    pub fn save_best_effort(&self, cache: &Cache) {
        if let Err(e) = self.save(cache) {
            warn!(path = %self.path.display(), error = %e, "cache ledger write failed; continuing with in-memory state");
        }
    }
}
