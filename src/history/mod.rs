//! The history chain and its head pointer.
//!
//! Version records live as `{prefix}{id}.diff` files in one directory. The
//! chain is never stored; it is recomputed from a directory listing on every
//! call. The head pointer is a separate `{ "version": ... }` blob naming the
//! record currently materialized into the document snapshot.

mod chain;
mod head;

pub use chain::{prefix_through, HistoryChain};
pub use head::HeadTracker;
