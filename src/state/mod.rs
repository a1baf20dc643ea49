//! Persisted last-promoted commit per (release, target, distribution, channel).
//!
//! Each record is a plain-text file holding a single commit hash. A missing
//! file means the channel was never promoted to.

mod store;

pub use store::{StateKey, StateStore};
