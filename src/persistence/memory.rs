//! In-process persistence with fault injection.

use super::PersistenceStore;
use crate::error::{HistoryError, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

/// Injected failures.
#[derive(Default)]
struct Faults {
    /// Writes to any path containing one of these fragments fail.
    write_fragments: Vec<String>,
    /// Every listing fails.
    listing: bool,
}

/// JSON blobs held in memory.
///
/// Blobs are kept as text so malformed content can be planted with
/// [`put_raw`](Self::put_raw). Writes require the parent directory to exist,
/// as they would on disk.
#[derive(Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<PathBuf, String>>,
    dirs: RwLock<BTreeSet<PathBuf>>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write whose path contains `fragment` fail.
    pub fn fail_writes_to(&self, fragment: impl Into<String>) {
        self.faults.lock().write_fragments.push(fragment.into());
    }

    /// Toggle failure of every directory listing.
    pub fn fail_listing(&self, fail: bool) {
        self.faults.lock().listing = fail;
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Store raw text at `path`, bypassing JSON encoding.
    pub fn put_raw(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files.write().insert(path.into(), text.into());
    }

    /// Delete the blob at `path`. Returns whether anything was removed.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.files.write().remove(path.as_ref()).is_some()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.read().contains_key(path.as_ref())
    }

    fn dir_exists(&self, dir: &Path) -> bool {
        dir.as_os_str().is_empty() || self.dirs.read().contains(dir)
    }
}

impl PersistenceStore for MemoryStore {
    fn read_json(&self, path: &Path) -> Result<Option<Value>> {
        let files = self.files.read();
        let Some(text) = files.get(path) else {
            return Ok(None);
        };

        let value = serde_json::from_str(text).map_err(|e| {
            HistoryError::Deserialization(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    fn write_json(&self, path: &Path, value: &Value) -> Result<()> {
        {
            let faults = self.faults.lock();
            let rendered = path.to_string_lossy();
            if let Some(fragment) = faults
                .write_fragments
                .iter()
                .find(|f| rendered.contains(f.as_str()))
            {
                return Err(HistoryError::Store(format!(
                    "injected write fault on {} ({})",
                    rendered, fragment
                )));
            }
        }

        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        if !self.dir_exists(parent) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory {} does not exist", parent.display()),
            )
            .into());
        }

        let text = serde_json::to_string(value)?;
        self.files.write().insert(path.to_path_buf(), text);
        Ok(())
    }

    fn list_names(&self, dir: &Path) -> Result<Vec<String>> {
        if self.faults.lock().listing {
            return Err(HistoryError::Store(format!(
                "injected listing fault on {}",
                dir.display()
            )));
        }

        if !self.dir_exists(dir) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory {} does not exist", dir.display()),
            )
            .into());
        }

        let names = self
            .files
            .read()
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        Ok(names)
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        let mut dirs = self.dirs.write();
        for ancestor in dir.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }
}
