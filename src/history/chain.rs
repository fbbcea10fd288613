//! Discovery and access of version records.

use crate::error::{HistoryError, Result};
use crate::persistence::PersistenceStore;
use crate::types::{FaultPolicy, VersionId};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::warn;

/// Ordered view over the version records in the history directory.
///
/// Parsed deltas are cached by identifier. Records are immutable once
/// written, so a cached delta never goes stale.
pub struct HistoryChain {
    /// Directory holding the records.
    dir: PathBuf,

    /// File name prefix preceding the digit run.
    prefix: String,

    /// How listing faults surface from [`versions`](Self::versions).
    policy: FaultPolicy,

    /// LRU cache of parsed deltas.
    cache: Mutex<LruCache<VersionId, Value>>,
}

impl HistoryChain {
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        policy: FaultPolicy,
        cache_size: usize,
    ) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);

        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            policy,
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Path of the record for `id`.
    pub fn record_path(&self, id: VersionId) -> PathBuf {
        self.dir.join(id.file_name(&self.prefix))
    }

    /// Every identifier found in the directory, ascending, duplicates kept.
    ///
    /// Names that do not match the record pattern are skipped. Faults
    /// propagate regardless of policy.
    pub fn scan(&self, store: &dyn PersistenceStore) -> Result<Vec<VersionId>> {
        let mut ids: Vec<VersionId> = store
            .list_names(&self.dir)?
            .iter()
            .filter_map(|name| VersionId::parse_file_name(&self.prefix, name))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Strictly increasing identifiers; faults propagate.
    pub fn versions_strict(&self, store: &dyn PersistenceStore) -> Result<Vec<VersionId>> {
        let mut ids = self.scan(store)?;
        let before = ids.len();
        ids.dedup();
        if ids.len() != before {
            warn!(
                dir = %self.dir.display(),
                duplicates = before - ids.len(),
                "records with the same identifier, keeping one"
            );
        }
        Ok(ids)
    }

    /// Strictly increasing identifiers, with listing faults handled per policy.
    ///
    /// Under [`FaultPolicy::Lenient`] a failed listing is logged and reported
    /// as an empty history, which is also the valid cold-start state.
    pub fn versions(&self, store: &dyn PersistenceStore) -> Result<Vec<VersionId>> {
        match self.versions_strict(store) {
            Ok(ids) => Ok(ids),
            Err(e) if self.policy == FaultPolicy::Lenient => {
                warn!(dir = %self.dir.display(), error = %e, "listing history failed, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Read the delta stored for `id`.
    pub fn read_delta(&self, store: &dyn PersistenceStore, id: VersionId) -> Result<Value> {
        if let Some(delta) = self.cache.lock().get(&id).cloned() {
            return Ok(delta);
        }

        let delta = store
            .read_json(&self.record_path(id))?
            .ok_or(HistoryError::MissingRecord(id))?;

        self.cache.lock().put(id, delta.clone());
        Ok(delta)
    }

    /// Persist `delta` as the record for `id`.
    pub fn write_delta(&self, store: &dyn PersistenceStore, id: VersionId, delta: &Value) -> Result<()> {
        store.write_json(&self.record_path(id), delta)?;
        self.cache.lock().put(id, delta.clone());
        Ok(())
    }
}

/// The portion of `versions` ending at and including `id`.
pub fn prefix_through(versions: &[VersionId], id: VersionId) -> Option<&[VersionId]> {
    versions
        .binary_search(&id)
        .ok()
        .map(|index| &versions[..=index])
}
