//! REVINDEX - Custom Error Types
//! Defines the error hierarchy for the revision index and its store.

use thiserror::Error;

/// Custom Result type for the revindex crate.
pub type Result<T> = std::result::Result<T, RevIndexError>;

/// Error types for the revision index and the store built on it.
#[derive(Error, Debug)]
pub enum RevIndexError {
    /// The key does not exist at the requested revision.
    #[error("revision not found")]
    RevisionNotFound,

    /// Internal index state is inconsistent. Not recoverable.
    #[error("compaction invariant violated: {0}")]
    CompactionInvariant(String),

    /// I/O errors from revision log operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (CRC mismatch, malformed revision bytes).
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// The requested revision has already been compacted away.
    #[error("revision {requested} has been compacted (boundary {compacted})")]
    Compacted { requested: i64, compacted: i64 },

    /// The requested revision is newer than anything written so far.
    #[error("revision {requested} is a future revision (current {current})")]
    FutureRevision { requested: i64, current: i64 },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for RevIndexError {
    fn from(err: bincode::Error) -> Self {
        RevIndexError::Serialization(err.to_string())
    }
}
