//! Directory-backed persistence.

use super::PersistenceStore;
use crate::error::{HistoryError, Result};
use fs2::FileExt;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Name of the advisory lock file held for the lifetime of the store.
const LOCK_FILE: &str = "LOCK";

/// Suffix for in-flight writes; renamed into place once synced.
const TMP_SUFFIX: &str = ".tmp";

/// JSON blobs stored as files under a root directory.
///
/// Holds an exclusive lock on `{root}/LOCK` so two processes cannot mutate
/// the same history concurrently.
pub struct FsStore {
    /// Base directory.
    root: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory if missing.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let lock_file = Self::acquire_lock(&root)?;

        Ok(Self {
            root,
            _lock_file: lock_file,
        })
    }

    /// Base directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn acquire_lock(root: &Path) -> Result<File> {
        let lock_file = File::create(root.join(LOCK_FILE))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| HistoryError::Locked)?;

        Ok(lock_file)
    }
}

impl PersistenceStore for FsStore {
    fn read_json(&self, path: &Path) -> Result<Option<Value>> {
        let full = self.resolve(path);
        let bytes = match fs::read(&full) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_slice(&bytes).map_err(|e| {
            HistoryError::Deserialization(format!("{}: {}", full.display(), e))
        })?;
        Ok(Some(value))
    }

    fn write_json(&self, path: &Path, value: &Value) -> Result<()> {
        let full = self.resolve(path);
        let bytes = serde_json::to_vec(value)?;

        let mut tmp_name = full.clone().into_os_string();
        tmp_name.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &full)?;
        Ok(())
    }

    fn list_names(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(self.resolve(dir))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        Ok(names)
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(self.resolve(dir))?;
        Ok(())
    }
}
