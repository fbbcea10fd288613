//! Document reconstruction by replaying the history chain.
//!
//! Replay always starts from the empty object and applies each record's
//! delta in ascending identifier order, so the value for a version depends
//! only on the records up to it.

mod replay;

pub use replay::{replay, replay_skipping_faults, Replayer};
