//! Core types for the document history.

use crate::error::HistoryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// File extension shared by every version record.
pub const RECORD_EXTENSION: &str = ".diff";

/// Identifier of a version record.
///
/// Minted from the wall clock in milliseconds and persisted as a decimal
/// string; ordering is numeric, never lexicographic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct VersionId(pub u64);

impl VersionId {
    /// Mint a new identifier strictly greater than `after`.
    ///
    /// The clock value is used when it is ahead; otherwise `after + 1`, so
    /// saves landing in the same millisecond still get distinct ids.
    pub fn mint(after: Option<VersionId>) -> Self {
        let now = Timestamp::now().0;
        match after {
            Some(prev) => VersionId(now.max(prev.0.saturating_add(1))),
            None => VersionId(now),
        }
    }

    /// Name of the record file for this version: `{prefix}{id}.diff`.
    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}{}{}", prefix, self.0, RECORD_EXTENSION)
    }

    /// Extract the identifier from a record file name.
    ///
    /// Only `prefix` + one or more ASCII digits + `.diff` matches, and the
    /// digit run must be the canonical rendering of the identifier so the
    /// name read back by [`file_name`](Self::file_name) is the one listed.
    pub fn parse_file_name(prefix: &str, name: &str) -> Option<Self> {
        let digits = name.strip_prefix(prefix)?.strip_suffix(RECORD_EXTENSION)?;
        let id: VersionId = digits.parse().ok()?;
        (id.file_name(prefix) == name).then_some(id)
    }
}

impl fmt::Debug for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionId({})", self.0)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VersionId {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HistoryError::InvalidVersion(s.to_string()));
        }
        s.parse::<u64>()
            .map(VersionId)
            .map_err(|_| HistoryError::InvalidVersion(s.to_string()))
    }
}

impl From<VersionId> for String {
    fn from(id: VersionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for VersionId {
    type Error = HistoryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as u64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// How store faults and malformed data are surfaced on read paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Log the fault and fall back to the weakest safe result: an empty
    /// history, no head, or an empty snapshot.
    #[default]
    Lenient,

    /// Propagate every fault as an error.
    Strict,
}

/// A version identifier together with the document value as of that version.
#[derive(Clone, Debug, PartialEq)]
pub struct Version {
    pub id: VersionId,
    pub value: Value,
}

/// Result of saving a new document state.
#[derive(Clone, Debug, PartialEq)]
pub enum SaveOutcome {
    /// The head now names this version and the snapshot holds its value.
    Saved(Version),

    /// No version record was written. Either the target was identical to the
    /// current snapshot, or the history is empty and the target is the empty
    /// object, in which case a stale snapshot is reset to it.
    NoChange,
}

impl SaveOutcome {
    /// The saved version, if anything was saved.
    pub fn version(&self) -> Option<&Version> {
        match self {
            SaveOutcome::Saved(version) => Some(version),
            SaveOutcome::NoChange => None,
        }
    }

    pub fn is_no_change(&self) -> bool {
        matches!(self, SaveOutcome::NoChange)
    }
}

/// Persisted head pointer: `{ "version": "<id>" | null }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadRecord {
    pub version: Option<VersionId>,
}

/// History statistics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoryStats {
    pub version_count: usize,
    pub head: Option<VersionId>,
    pub initial: Option<VersionId>,
    pub latest: Option<VersionId>,
}

/// Result of checking the persisted history against its invariants.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntegrityReport {
    /// Number of version records found.
    pub version_count: usize,

    /// Identifiers are strictly increasing.
    pub chain_ordered: bool,

    /// The head is none or names a version in the chain.
    pub head_in_chain: bool,

    /// The snapshot equals the value replayed up to the head.
    pub snapshot_matches_head: bool,

    /// Records that could not be read or applied during replay.
    pub unreadable: Vec<VersionId>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.chain_ordered
            && self.head_in_chain
            && self.snapshot_matches_head
            && self.unreadable.is_empty()
    }
}

/// The empty document every history starts from.
pub fn empty_document() -> Value {
    Value::Object(serde_json::Map::new())
}
