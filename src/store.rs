//! Main Store struct tying all components together.

use crate::codec::{DiffCodec, StructuralCodec};
use crate::error::{HistoryError, Result};
use crate::history::{prefix_through, HeadTracker, HistoryChain};
use crate::persistence::{FsStore, MemoryStore, PersistenceStore};
use crate::state::{replay, replay_skipping_faults, Replayer};
use crate::types::{
    empty_document, FaultPolicy, HistoryStats, IntegrityReport, SaveOutcome, Version, VersionId,
};
use crate::wal::{JournalOperation, JournalStatus, RecoveryAction, SaveJournal};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Store configuration.
///
/// All paths are relative to the root of the persistence store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Location of the document snapshot.
    pub snapshot_path: PathBuf,

    /// Location of the head pointer record.
    pub head_path: PathBuf,

    /// Directory holding the version records.
    pub history_dir: PathBuf,

    /// Prefix of version record file names (`{prefix}{id}.diff`).
    pub record_prefix: String,

    /// Location of the write-ahead journal.
    pub journal_path: PathBuf,

    /// Parsed delta cache size (number of records).
    pub delta_cache_size: usize,

    /// How store faults surface on read paths.
    pub fault_policy: FaultPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("document.json"),
            head_path: PathBuf::from("head.json"),
            history_dir: PathBuf::from("history"),
            record_prefix: "v".to_string(),
            journal_path: PathBuf::from("history/journal.json"),
            delta_cache_size: 256,
            fault_policy: FaultPolicy::Lenient,
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Backward,
    Forward,
}

/// The version immediately before or after `head` in `versions`.
fn neighbor(
    versions: &[VersionId],
    head: Option<VersionId>,
    direction: Direction,
) -> Option<VersionId> {
    let index = versions.binary_search(&head?).ok()?;
    match direction {
        Direction::Backward => index.checked_sub(1).map(|i| versions[i]),
        Direction::Forward => versions.get(index + 1).copied(),
    }
}

/// A JSON document with a linear history of forward diffs.
///
/// Provides a unified interface for:
/// - Saving new document states as version records
/// - Reconstructing the document as of any recorded version
/// - Moving the head backward and forward through history
///
/// Mutations are serialized per store handle. Head, snapshot and chain are
/// re-read from the persistence store on every call.
pub struct Store<S, C = StructuralCodec> {
    /// Store configuration.
    config: StoreConfig,

    /// Where snapshot, head, records and journal live.
    persistence: S,

    /// Delta codec used to write and replay records.
    codec: C,

    /// Version record access.
    chain: HistoryChain,

    /// Head pointer access.
    head: HeadTracker,

    /// Write-ahead journal for multi-write mutations.
    journal: SaveJournal,

    /// Highest identifier minted by this handle.
    last_minted: Mutex<Option<VersionId>>,

    /// Lock for write operations to ensure atomicity.
    write_lock: Mutex<()>,
}

impl Store<FsStore> {
    /// Open or create a history in directory `path` with default settings.
    pub fn open_dir(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(FsStore::open(path)?, StructuralCodec, StoreConfig::default())
    }
}

impl Store<MemoryStore> {
    /// A fresh history held in memory.
    pub fn in_memory() -> Result<Self> {
        Self::open(MemoryStore::new(), StructuralCodec, StoreConfig::default())
    }
}

impl<S: PersistenceStore, C: DiffCodec> Store<S, C> {
    /// Open a history over `persistence`.
    ///
    /// Creates the history directory, initializes the head pointer on first
    /// use and finishes or discards any mutation interrupted by a crash.
    pub fn open(persistence: S, codec: C, config: StoreConfig) -> Result<Self> {
        persistence.ensure_dir(&config.history_dir)?;
        for path in [&config.snapshot_path, &config.head_path, &config.journal_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                persistence.ensure_dir(parent)?;
            }
        }

        let chain = HistoryChain::new(
            config.history_dir.clone(),
            config.record_prefix.clone(),
            config.fault_policy,
            config.delta_cache_size,
        );
        let head = HeadTracker::new(config.head_path.clone(), config.fault_policy);
        let journal = SaveJournal::new(config.journal_path.clone());

        head.initialize(&persistence)?;

        let store = Self {
            config,
            persistence,
            codec,
            chain,
            head,
            journal,
            last_minted: Mutex::new(None),
            write_lock: Mutex::new(()),
        };
        store.recover()?;

        Ok(store)
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The underlying persistence store.
    pub fn persistence(&self) -> &S {
        &self.persistence
    }

    fn replayer(&self) -> Replayer<'_> {
        Replayer {
            store: &self.persistence,
            chain: &self.chain,
            codec: &self.codec,
        }
    }

    // --- History Chain ---

    /// All version identifiers, ascending. Empty if none exist.
    ///
    /// Under [`FaultPolicy::Lenient`] a listing fault is logged and reported
    /// as an empty history.
    pub fn list_versions(&self) -> Result<Vec<VersionId>> {
        self.chain.versions(&self.persistence)
    }

    // --- Head ---

    /// The version currently materialized into the snapshot, if any.
    pub fn current_version(&self) -> Result<Option<VersionId>> {
        self.head.current(&self.persistence)
    }

    /// Point the head at `id` without touching the snapshot.
    ///
    /// Returns `false`, writing nothing, if `id` is not in the history.
    pub fn set_current_version(&self, id: VersionId) -> Result<bool> {
        let _lock = self.write_lock.lock();

        let versions = self.chain.versions_strict(&self.persistence)?;
        if versions.binary_search(&id).is_err() {
            return Ok(false);
        }

        self.head.set(&self.persistence, Some(id))?;
        Ok(true)
    }

    // --- Snapshot ---

    /// The current document snapshot; the empty object if none was written.
    pub fn snapshot(&self) -> Result<Value> {
        match self.persistence.read_json(&self.config.snapshot_path) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Ok(empty_document()),
            Err(e) if self.config.fault_policy == FaultPolicy::Lenient => {
                warn!(error = %e, "unreadable snapshot, treating as empty");
                Ok(empty_document())
            }
            Err(e) => Err(e),
        }
    }

    /// Snapshot as seen by a save: `None` when absent, or when malformed
    /// under the lenient policy. I/O faults abort the save.
    fn snapshot_for_save(&self) -> Result<Option<Value>> {
        match self.persistence.read_json(&self.config.snapshot_path) {
            Ok(snapshot) => Ok(snapshot),
            Err(HistoryError::Deserialization(msg))
                if self.config.fault_policy == FaultPolicy::Lenient =>
            {
                warn!(error = %msg, "malformed snapshot, rebuilding from history");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write_snapshot(&self, value: &Value) -> Result<()> {
        self.persistence.write_json(&self.config.snapshot_path, value)
    }

    // --- Saving ---

    /// Save `target` as the new document state.
    ///
    /// Returns [`SaveOutcome::NoChange`] without writing anything when
    /// `target` equals the current snapshot. With an empty history an empty
    /// object target also returns `NoChange`, after resetting any stale
    /// snapshot to `{}`. Otherwise appends one version
    /// record, advances the head to it and overwrites the snapshot.
    ///
    /// The delta is taken against the snapshot when the head is at the
    /// latest version. When the head was moved back, or the snapshot is
    /// missing, it is taken against the replayed latest version instead, so
    /// replaying the chain from the start always reproduces every saved
    /// value.
    pub fn save_new_version(&self, target: Value) -> Result<SaveOutcome> {
        let _lock = self.write_lock.lock();

        let snapshot = self.snapshot_for_save()?;
        let versions = self.chain.versions_strict(&self.persistence)?;
        let head = self.head.current(&self.persistence)?;
        let latest = versions.last().copied();

        let in_sync = snapshot.is_some() && head.is_some() && head == latest;
        let current = snapshot.unwrap_or_else(empty_document);

        let base = if in_sync {
            current
        } else {
            if self.codec.diff(&current, &target)?.is_none() {
                debug!("target matches snapshot, nothing to save");
                return Ok(SaveOutcome::NoChange);
            }
            debug!(?head, ?latest, "head is not at the latest version, diffing against it");
            replay(self.replayer(), &versions)?
        };

        let delta = match self.codec.diff(&base, &target)? {
            Some(delta) => delta,
            None if in_sync => {
                debug!("target matches snapshot, nothing to save");
                return Ok(SaveOutcome::NoChange);
            }
            None => return self.realign_to_latest(latest, target),
        };

        let id = self.mint(latest);
        let patched = self.codec.apply(&base, &delta)?;

        let entry = self
            .journal
            .begin(&self.persistence, id, JournalOperation::Save)?;
        self.chain.write_delta(&self.persistence, id, &delta)?;
        self.head.set(&self.persistence, Some(id))?;
        self.write_snapshot(&patched)?;
        self.journal.commit(&self.persistence, &entry)?;

        debug!(version = %id, "saved new version");
        Ok(SaveOutcome::Saved(Version { id, value: patched }))
    }

    /// `target` already equals the latest recorded value: move the head and
    /// snapshot there instead of recording an empty delta.
    fn realign_to_latest(
        &self,
        latest: Option<VersionId>,
        target: Value,
    ) -> Result<SaveOutcome> {
        match latest {
            Some(id) => {
                self.materialize(id, &target, JournalOperation::Apply)?;
                debug!(version = %id, "target equals latest version, head moved there");
                Ok(SaveOutcome::Saved(Version { id, value: target }))
            }
            None => {
                // No history: the empty object needs no record, only a
                // snapshot reset.
                self.write_snapshot(&target)?;
                Ok(SaveOutcome::NoChange)
            }
        }
    }

    /// Mint an identifier above both the chain and anything minted here.
    fn mint(&self, latest: Option<VersionId>) -> VersionId {
        let mut last = self.last_minted.lock();
        let id = VersionId::mint((*last).max(latest));
        *last = Some(id);
        id
    }

    /// Write `value` as the snapshot and `id` as the head under the journal.
    fn materialize(&self, id: VersionId, value: &Value, operation: JournalOperation) -> Result<()> {
        let entry = self.journal.begin(&self.persistence, id, operation)?;
        self.write_snapshot(value)?;
        self.head.set(&self.persistence, Some(id))?;
        self.journal.commit(&self.persistence, &entry)
    }

    // --- Reconstruction ---

    /// The document as of version `id`.
    ///
    /// `None` if `id` is not in the history or the head is none. Replay
    /// starts from the empty object; a missing or corrupt record on the way
    /// is an error.
    pub fn reconstruct(&self, id: VersionId) -> Result<Option<Value>> {
        let head = self.current_version()?;
        let versions = self.list_versions()?;
        self.reconstruct_in(&versions, head, id)
    }

    fn reconstruct_in(
        &self,
        versions: &[VersionId],
        head: Option<VersionId>,
        id: VersionId,
    ) -> Result<Option<Value>> {
        if head.is_none() {
            return Ok(None);
        }
        self.replay_through(versions, id)
    }

    fn replay_through(&self, versions: &[VersionId], id: VersionId) -> Result<Option<Value>> {
        match prefix_through(versions, id) {
            Some(prefix) => replay(self.replayer(), prefix).map(Some),
            None => Ok(None),
        }
    }

    fn version_in(
        &self,
        versions: &[VersionId],
        head: Option<VersionId>,
        id: Option<VersionId>,
    ) -> Result<Option<Version>> {
        let Some(id) = id else {
            return Ok(None);
        };
        Ok(self
            .reconstruct_in(versions, head, id)?
            .map(|value| Version { id, value }))
    }

    // --- Navigation ---

    /// The version just before the head.
    ///
    /// `None` if the head is none, not in the history, or already first.
    pub fn previous(&self) -> Result<Option<VersionId>> {
        let versions = self.list_versions()?;
        Ok(neighbor(&versions, self.current_version()?, Direction::Backward))
    }

    /// The version just after the head.
    ///
    /// `None` if the head is none, not in the history, or already last.
    pub fn next(&self) -> Result<Option<VersionId>> {
        let versions = self.list_versions()?;
        Ok(neighbor(&versions, self.current_version()?, Direction::Forward))
    }

    /// The first version, reconstructed. `None` on an empty history.
    pub fn initial(&self) -> Result<Option<Version>> {
        let versions = self.list_versions()?;
        let head = self.current_version()?;
        self.version_in(&versions, head, versions.first().copied())
    }

    /// The last version, reconstructed. `None` on an empty history.
    pub fn latest(&self) -> Result<Option<Version>> {
        let versions = self.list_versions()?;
        let head = self.current_version()?;
        self.version_in(&versions, head, versions.last().copied())
    }

    /// Materialize version `id`: overwrite the snapshot with its value and
    /// point the head at it. `None` if it cannot be reconstructed.
    pub fn apply_version(&self, id: VersionId) -> Result<Option<Version>> {
        self.apply_with(|_, _| Some(id))
    }

    /// Materialize the version before the head.
    pub fn apply_previous(&self) -> Result<Option<Version>> {
        self.apply_with(|versions, head| neighbor(versions, head, Direction::Backward))
    }

    /// Materialize the version after the head.
    pub fn apply_next(&self) -> Result<Option<Version>> {
        self.apply_with(|versions, head| neighbor(versions, head, Direction::Forward))
    }

    /// Materialize the first version.
    pub fn apply_initial(&self) -> Result<Option<Version>> {
        self.apply_with(|versions, _| versions.first().copied())
    }

    /// Materialize the last version.
    pub fn apply_latest(&self) -> Result<Option<Version>> {
        self.apply_with(|versions, _| versions.last().copied())
    }

    /// Pick a target under the write lock and materialize it.
    fn apply_with(
        &self,
        pick: impl FnOnce(&[VersionId], Option<VersionId>) -> Option<VersionId>,
    ) -> Result<Option<Version>> {
        let _lock = self.write_lock.lock();

        let versions = self.chain.versions_strict(&self.persistence)?;
        let head = self.head.current(&self.persistence)?;

        let Some(version) = self.version_in(&versions, head, pick(versions.as_slice(), head))? else {
            return Ok(None);
        };

        self.materialize(version.id, &version.value, JournalOperation::Apply)?;
        debug!(version = %version.id, "applied version");
        Ok(Some(version))
    }

    // --- Maintenance ---

    /// Finish or discard a mutation left pending by a crash.
    ///
    /// Runs on open. A pending entry whose record exists is rolled forward:
    /// the snapshot is rebuilt by replay and the head set to it. A pending
    /// save whose record was never written is rolled back.
    pub fn recover(&self) -> Result<RecoveryAction> {
        let _lock = self.write_lock.lock();

        let Some(entry) = self.journal.read(&self.persistence)? else {
            return Ok(RecoveryAction::Clean);
        };
        if entry.status != JournalStatus::Pending {
            return Ok(RecoveryAction::Clean);
        }

        let versions = self.chain.versions_strict(&self.persistence)?;
        match self.replay_through(&versions, entry.version)? {
            Some(value) => {
                self.write_snapshot(&value)?;
                self.head.set(&self.persistence, Some(entry.version))?;
                self.journal.commit(&self.persistence, &entry)?;
                info!(
                    version = %entry.version,
                    operation = ?entry.operation,
                    "rolled forward interrupted mutation"
                );
                Ok(RecoveryAction::RolledForward(entry.version))
            }
            None => {
                self.journal.roll_back(&self.persistence, &entry)?;
                info!(
                    version = %entry.version,
                    operation = ?entry.operation,
                    "rolled back interrupted mutation"
                );
                Ok(RecoveryAction::RolledBack(entry.version))
            }
        }
    }

    /// Counts and endpoints of the history.
    pub fn stats(&self) -> Result<HistoryStats> {
        let versions = self.list_versions()?;
        Ok(HistoryStats {
            version_count: versions.len(),
            head: self.current_version()?,
            initial: versions.first().copied(),
            latest: versions.last().copied(),
        })
    }

    /// Check the persisted history against its invariants.
    ///
    /// Replays every record, so cost grows with history length. Listing
    /// faults propagate; unreadable records are reported, not raised.
    pub fn verify(&self) -> Result<IntegrityReport> {
        let scanned = self.chain.scan(&self.persistence)?;
        let chain_ordered = scanned.windows(2).all(|pair| pair[0] < pair[1]);

        let versions = self.chain.versions_strict(&self.persistence)?;
        let head = self.current_version()?;

        let split = match head {
            Some(id) => prefix_through(&versions, id).map(|prefix| prefix.len()),
            None => Some(0),
        };
        let head_in_chain = split.is_some();
        let split = split.unwrap_or(versions.len());

        let (at_head, mut unreadable) =
            replay_skipping_faults(self.replayer(), empty_document(), &versions[..split]);
        let head_replayed = unreadable.is_empty();
        let (_, rest) = replay_skipping_faults(self.replayer(), at_head.clone(), &versions[split..]);
        unreadable.extend(rest);

        let snapshot_matches_head = head_in_chain
            && head_replayed
            && match self.persistence.read_json(&self.config.snapshot_path) {
                Ok(Some(snapshot)) => snapshot == at_head,
                Ok(None) => at_head == empty_document(),
                Err(_) => false,
            };

        Ok(IntegrityReport {
            version_count: versions.len(),
            chain_ordered,
            head_in_chain,
            snapshot_matches_head,
            unreadable,
        })
    }
}
