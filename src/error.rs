//! Typed errors for operations that must fail loudly.
//!
//! Routing self-heals (fallback to a new thread), but merge, split, and mode
//! changes reject invalid input with no partial mutation. Callers match on
//! [`EngineError`] to distinguish the rejection reasons.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced thread does not exist in primary storage.
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// Merge or auto-suspend attempted on a thread protected by a split lock.
    #[error("thread is split-locked: {0}")]
    SplitLocked(String),

    /// A split partition named message ids the source thread does not own.
    #[error("unknown message ids in partition '{partition}': {ids:?}")]
    UnknownMessages { partition: String, ids: Vec<String> },

    /// The same message id appeared in more than one split partition.
    #[error("message {0} assigned to multiple partitions")]
    DuplicatePartitionMessage(String),

    /// Quota mode string not one of light/normal/heavy/max.
    #[error("unknown quota mode: {0}")]
    InvalidMode(String),
}
