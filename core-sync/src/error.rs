//! Error types for the sync engine

use core_store::WorkerId;
use thiserror::Error;

/// Errors that can occur during sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local database or repository failure
    #[error("Store error: {0}")]
    Store(#[from] core_store::StoreError),

    /// Remote API or file transfer failure
    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    /// A sync session is already running
    #[error("Sync session {0} is already in progress")]
    SessionInProgress(WorkerId),

    /// No session exists for the given worker ID
    #[error("No sync session found for worker {0}")]
    WorkerNotFound(WorkerId),

    /// Attempted an invalid progress state transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// The session was cancelled before the operation could finish
    #[error("Sync session was cancelled")]
    Cancelled,

    /// A download exceeded the configured timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Logging initialization failure
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
