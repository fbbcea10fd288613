//! Head pointer persistence.

use crate::error::{HistoryError, Result};
use crate::persistence::PersistenceStore;
use crate::types::{FaultPolicy, HeadRecord, VersionId};
use std::path::PathBuf;
use tracing::warn;

/// Tracks which version is materialized into the document snapshot.
///
/// The pointer is re-read on every call; nothing is cached across calls.
pub struct HeadTracker {
    /// Path of the `{ "version": ... }` record.
    path: PathBuf,

    /// How unreadable records surface.
    policy: FaultPolicy,
}

impl HeadTracker {
    pub fn new(path: impl Into<PathBuf>, policy: FaultPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    /// Write a `none` record if no record exists yet.
    ///
    /// A malformed record is left in place for the read path to report.
    pub fn initialize(&self, store: &dyn PersistenceStore) -> Result<()> {
        if matches!(store.read_json(&self.path), Ok(None)) {
            self.set(store, None)?;
        }
        Ok(())
    }

    /// The current head, or `None`.
    ///
    /// A missing record is `None`. A malformed or unreadable record is `None`
    /// plus a warning under [`FaultPolicy::Lenient`], an error otherwise.
    pub fn current(&self, store: &dyn PersistenceStore) -> Result<Option<VersionId>> {
        match self.read(store) {
            Ok(head) => Ok(head),
            Err(e) if self.policy == FaultPolicy::Lenient => {
                warn!(path = %self.path.display(), error = %e, "unreadable head pointer, treating as none");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist `version` as the head.
    pub fn set(&self, store: &dyn PersistenceStore, version: Option<VersionId>) -> Result<()> {
        let record = serde_json::to_value(HeadRecord { version })?;
        store.write_json(&self.path, &record)
    }

    fn read(&self, store: &dyn PersistenceStore) -> Result<Option<VersionId>> {
        let Some(value) = store.read_json(&self.path)? else {
            return Ok(None);
        };

        let record: HeadRecord = serde_json::from_value(value)
            .map_err(|e| HistoryError::Deserialization(format!("head pointer: {}", e)))?;
        Ok(record.version)
    }
}
