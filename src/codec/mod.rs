//! Diff codec capability.
//!
//! A codec turns two document values into a JSON-encoded delta and applies
//! such a delta back onto a base value. Version records persist exactly what
//! [`DiffCodec::diff`] returns, so the codec used to read a history must be
//! the one that wrote it.

mod structural;

pub use structural::{Delta, ItemDelta, StructuralCodec};

use crate::error::Result;
use serde_json::Value;

/// Computes and applies deltas between JSON values.
///
/// Contract: for any `a` and `b`, if `diff(a, b)` yields `Some(delta)` then
/// `apply(a, &delta)` is deep-equal to `b`; `diff(a, b)` is `None` exactly
/// when `a == b`.
pub trait DiffCodec: Send + Sync {
    /// Delta turning `from` into `to`, or `None` if they are equal.
    fn diff(&self, from: &Value, to: &Value) -> Result<Option<Value>>;

    /// Apply `delta` to `base`.
    fn apply(&self, base: &Value, delta: &Value) -> Result<Value>;
}
