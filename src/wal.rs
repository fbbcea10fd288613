//! Write-ahead journal for multi-step mutations.
//!
//! A save writes the version record, the head pointer and the snapshot as
//! three separate store operations. The journal is written before the first
//! of them and marked committed after the last, so a crash in between leaves
//! a `pending` entry that [`Store::recover`](crate::Store::recover) can roll
//! forward or discard.

use crate::error::{HistoryError, Result};
use crate::persistence::PersistenceStore;
use crate::types::{Timestamp, VersionId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Journal entry status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    /// Mutation started; its writes may be partially applied.
    Pending,
    /// Every write of the mutation completed.
    Committed,
    /// The mutation was abandoned during recovery.
    RolledBack,
}

/// Mutations that are journaled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalOperation {
    /// Append a version record, then materialize it.
    Save,
    /// Materialize an existing version.
    Apply,
}

/// The most recent journaled mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Increases by one per mutation.
    pub seq: u64,
    /// Version being materialized.
    pub version: VersionId,
    pub operation: JournalOperation,
    pub status: JournalStatus,
    pub timestamp: Timestamp,
}

/// What recovery did with the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing was pending.
    Clean,
    /// A pending mutation was completed; head and snapshot name this version.
    RolledForward(VersionId),
    /// A pending save never wrote its record and was discarded.
    RolledBack(VersionId),
}

/// Single-entry journal stored as one JSON blob.
///
/// Mutations are serialized by the caller, so only the latest entry matters.
pub struct SaveJournal {
    path: PathBuf,
}

impl SaveJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The latest entry, if any. A malformed journal is corruption.
    pub fn read(&self, store: &dyn PersistenceStore) -> Result<Option<JournalEntry>> {
        let Some(value) = store.read_json(&self.path)? else {
            return Ok(None);
        };

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| HistoryError::Corruption(format!("journal: {}", e)))
    }

    /// Record the start of a mutation.
    pub fn begin(
        &self,
        store: &dyn PersistenceStore,
        version: VersionId,
        operation: JournalOperation,
    ) -> Result<JournalEntry> {
        let seq = match self.read(store) {
            Ok(Some(entry)) => entry.seq + 1,
            _ => 1,
        };

        let entry = JournalEntry {
            seq,
            version,
            operation,
            status: JournalStatus::Pending,
            timestamp: Timestamp::now(),
        };
        self.write(store, &entry)?;
        Ok(entry)
    }

    /// Mark `entry` as committed.
    pub fn commit(&self, store: &dyn PersistenceStore, entry: &JournalEntry) -> Result<()> {
        self.finish(store, entry, JournalStatus::Committed)
    }

    /// Mark `entry` as rolled back.
    pub fn roll_back(&self, store: &dyn PersistenceStore, entry: &JournalEntry) -> Result<()> {
        self.finish(store, entry, JournalStatus::RolledBack)
    }

    fn finish(
        &self,
        store: &dyn PersistenceStore,
        entry: &JournalEntry,
        status: JournalStatus,
    ) -> Result<()> {
        let entry = JournalEntry {
            status,
            timestamp: Timestamp::now(),
            ..entry.clone()
        };
        self.write(store, &entry)
    }

    fn write(&self, store: &dyn PersistenceStore, entry: &JournalEntry) -> Result<()> {
        let value = serde_json::to_value(entry)?;
        store.write_json(&self.path, &value)
    }
}
