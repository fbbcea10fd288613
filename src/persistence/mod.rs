//! Persistence capability consumed by the history core.
//!
//! The core never touches the filesystem directly. It reads and writes JSON
//! blobs by relative path and lists directory entries through
//! [`PersistenceStore`], so the same logic runs over a directory tree
//! ([`FsStore`]) or an in-process map ([`MemoryStore`]).

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::error::Result;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Key-value-like access to JSON blobs addressed by relative path.
pub trait PersistenceStore: Send + Sync {
    /// Read and parse the blob at `path`. `Ok(None)` when nothing is stored there.
    fn read_json(&self, path: &Path) -> Result<Option<Value>>;

    /// Replace the blob at `path`.
    fn write_json(&self, path: &Path, value: &Value) -> Result<()>;

    /// Names of the entries directly inside `dir`.
    fn list_names(&self, dir: &Path) -> Result<Vec<String>>;

    /// Create `dir` and any missing ancestors.
    fn ensure_dir(&self, dir: &Path) -> Result<()>;
}

impl<S: PersistenceStore + ?Sized> PersistenceStore for Arc<S> {
    fn read_json(&self, path: &Path) -> Result<Option<Value>> {
        (**self).read_json(path)
    }

    fn write_json(&self, path: &Path, value: &Value) -> Result<()> {
        (**self).write_json(path, value)
    }

    fn list_names(&self, dir: &Path) -> Result<Vec<String>> {
        (**self).list_names(dir)
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        (**self).ensure_dir(dir)
    }
}
