//! Sequential delta replay.

use crate::codec::DiffCodec;
use crate::error::{HistoryError, Result};
use crate::history::HistoryChain;
use crate::persistence::PersistenceStore;
use crate::types::{empty_document, VersionId};
use serde_json::Value;
use tracing::warn;

/// Borrowed collaborators needed to replay records.
#[derive(Clone, Copy)]
pub struct Replayer<'a> {
    pub store: &'a dyn PersistenceStore,
    pub chain: &'a HistoryChain,
    pub codec: &'a dyn DiffCodec,
}

impl<'a> Replayer<'a> {
    /// Apply the record for `id` on top of `value`.
    pub fn step(&self, value: &Value, id: VersionId) -> Result<Value> {
        let delta = self.chain.read_delta(self.store, id)?;
        self.codec.apply(value, &delta).map_err(|e| match e {
            HistoryError::Codec(msg) | HistoryError::Deserialization(msg) => {
                HistoryError::Corruption(format!("record {}: {}", id, msg))
            }
            other => other,
        })
    }
}

/// Replay `versions` in order from the empty object.
///
/// A missing or corrupt record aborts the replay.
pub fn replay(replayer: Replayer<'_>, versions: &[VersionId]) -> Result<Value> {
    versions
        .iter()
        .try_fold(empty_document(), |value, id| replayer.step(&value, *id))
}

/// Replay `versions` on top of `start`, skipping records that cannot be
/// read or applied.
///
/// Returns the value reached and the identifiers that were skipped.
pub fn replay_skipping_faults(
    replayer: Replayer<'_>,
    start: Value,
    versions: &[VersionId],
) -> (Value, Vec<VersionId>) {
    let mut value = start;
    let mut skipped = Vec::new();

    for id in versions {
        match replayer.step(&value, *id) {
            Ok(next) => value = next,
            Err(e) => {
                warn!(version = %id, error = %e, "skipping unreadable record");
                skipped.push(*id);
            }
        }
    }

    (value, skipped)
}
