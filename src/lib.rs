//! # diffchain
//!
//! A single evolving JSON document persisted as a linear chain of forward
//! diffs, with a head pointer marking the version currently materialized.
//!
//! ## Core Concepts
//!
//! - **Snapshot**: the document as it currently stands
//! - **Version records**: one delta per save, named `{prefix}{id}.diff`
//! - **History chain**: record identifiers in ascending numeric order
//! - **Head**: the version the snapshot corresponds to
//!
//! Any version is rebuilt by replaying the chain from the empty object.
//!
//! ## Example
//!
//! ```ignore
//! use diffchain::Store;
//! use serde_json::json;
//!
//! let store = Store::open_dir("./my-doc")?;
//!
//! store.save_new_version(json!({"a": 1}))?;
//! store.save_new_version(json!({"a": 1, "b": 2}))?;
//!
//! // Step back one version
//! store.apply_previous()?;
//! assert_eq!(store.snapshot()?, json!({"a": 1}));
//! ```

#[cfg(feature = "tokio")]
pub mod asynchronous;
pub mod codec;
pub mod error;
pub mod history;
pub mod persistence;
pub mod state;
pub mod store;
pub mod types;
pub mod wal;

// Re-exports
#[cfg(feature = "tokio")]
pub use asynchronous::AsyncStore;
pub use codec::{Delta, DiffCodec, StructuralCodec};
pub use error::{HistoryError, Result};
pub use history::{HeadTracker, HistoryChain};
pub use persistence::{FsStore, MemoryStore, PersistenceStore};
pub use store::{Store, StoreConfig};
pub use types::*;
pub use wal::{JournalEntry, JournalOperation, JournalStatus, RecoveryAction, SaveJournal};
