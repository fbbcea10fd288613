//! Async access to a [`Store`].
//!
//! The store's logic is synchronous. This wrapper runs each call in tokio's
//! blocking task pool so async callers can await history operations without
//! stalling the runtime. Every call is still one uninterrupted unit of work.

use crate::codec::{DiffCodec, StructuralCodec};
use crate::error::{HistoryError, Result};
use crate::persistence::PersistenceStore;
use crate::store::Store;
use crate::types::{HistoryStats, IntegrityReport, SaveOutcome, Version, VersionId};
use crate::wal::RecoveryAction;
use serde_json::Value;
use std::sync::Arc;

/// Async handle sharing one [`Store`].
pub struct AsyncStore<S, C = StructuralCodec> {
    inner: Arc<Store<S, C>>,
}

impl<S, C> Clone for AsyncStore<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, C> AsyncStore<S, C>
where
    S: PersistenceStore + 'static,
    C: DiffCodec + 'static,
{
    pub fn new(store: Store<S, C>) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// The shared synchronous store.
    pub fn blocking(&self) -> &Arc<Store<S, C>> {
        &self.inner
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store<S, C>) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.inner);

        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| HistoryError::Join(e.to_string()))?
    }

    pub async fn list_versions(&self) -> Result<Vec<VersionId>> {
        self.run(|store| store.list_versions()).await
    }

    pub async fn current_version(&self) -> Result<Option<VersionId>> {
        self.run(|store| store.current_version()).await
    }

    pub async fn set_current_version(&self, id: VersionId) -> Result<bool> {
        self.run(move |store| store.set_current_version(id)).await
    }

    pub async fn snapshot(&self) -> Result<Value> {
        self.run(|store| store.snapshot()).await
    }

    pub async fn save_new_version(&self, target: Value) -> Result<SaveOutcome> {
        self.run(move |store| store.save_new_version(target)).await
    }

    pub async fn reconstruct(&self, id: VersionId) -> Result<Option<Value>> {
        self.run(move |store| store.reconstruct(id)).await
    }

    pub async fn previous(&self) -> Result<Option<VersionId>> {
        self.run(|store| store.previous()).await
    }

    pub async fn next(&self) -> Result<Option<VersionId>> {
        self.run(|store| store.next()).await
    }

    pub async fn initial(&self) -> Result<Option<Version>> {
        self.run(|store| store.initial()).await
    }

    pub async fn latest(&self) -> Result<Option<Version>> {
        self.run(|store| store.latest()).await
    }

    pub async fn apply_version(&self, id: VersionId) -> Result<Option<Version>> {
        self.run(move |store| store.apply_version(id)).await
    }

    pub async fn apply_previous(&self) -> Result<Option<Version>> {
        self.run(|store| store.apply_previous()).await
    }

    pub async fn apply_next(&self) -> Result<Option<Version>> {
        self.run(|store| store.apply_next()).await
    }

    pub async fn apply_initial(&self) -> Result<Option<Version>> {
        self.run(|store| store.apply_initial()).await
    }

    pub async fn apply_latest(&self) -> Result<Option<Version>> {
        self.run(|store| store.apply_latest()).await
    }

    pub async fn recover(&self) -> Result<RecoveryAction> {
        self.run(|store| store.recover()).await
    }

    pub async fn stats(&self) -> Result<HistoryStats> {
        self.run(|store| store.stats()).await
    }

    pub async fn verify(&self) -> Result<IntegrityReport> {
        self.run(|store| store.verify()).await
    }
}

impl<S, C> From<Store<S, C>> for AsyncStore<S, C>
where
    S: PersistenceStore + 'static,
    C: DiffCodec + 'static,
{
    fn from(store: Store<S, C>) -> Self {
        Self::new(store)
    }
}
