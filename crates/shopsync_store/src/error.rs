//! Error types for the snapshot store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in snapshot store and lease operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    Codec(String),

    /// Another process holds the run lease.
    #[error("run lease held by {holder} for {held_for_ms}ms")]
    LeaseHeld {
        /// Identity of the current holder, as recorded in the lease file.
        holder: String,
        /// How long the lease has been held.
        held_for_ms: u64,
    },

    /// The data directory path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),
}
