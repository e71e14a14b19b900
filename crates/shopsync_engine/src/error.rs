//! Error types for the sync engine.

use shopsync_model::PlatformId;
use shopsync_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort a synchronization pass.
///
/// Per-entity trouble (rejections, rate-limit exhaustion, missing SKUs) is
/// not an `EngineError`; it is isolated into entity-level failures and
/// surfaced through the audit sink. An `EngineError` means the pass as a
/// whole could not proceed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another run holds the exclusive lease; this invocation had no side
    /// effects.
    #[error("another run holds the lease ({holder}, {held_for_ms}ms)")]
    LeaseContention {
        /// Identity of the lease holder.
        holder: String,
        /// How long the lease has been held.
        held_for_ms: u64,
    },

    /// A platform cannot be reached or authenticated at all.
    #[error("fatal connectivity failure on {platform}: {message}")]
    FatalConnectivity {
        /// The unreachable platform.
        platform: PlatformId,
        /// Underlying failure.
        message: String,
    },

    /// Snapshot store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The pass was cancelled before any work started.
    #[error("run cancelled")]
    Cancelled,
}
