//! Error types for bridge implementations

use thiserror::Error;

/// Failure taxonomy for external collaborators.
///
/// The sync engine maps these onto per-file and per-session outcomes:
/// `Network` failures mark the affected file failed but are retryable by a
/// later session, `Authorization` is surfaced without retry, `StorageFull`
/// is session-fatal, and `NotFound` fails only the file that vanished.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Remote record not found: {0}")]
    NotFound(String),

    #[error("Device storage full: {0}")]
    StorageFull(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether a later sync session may succeed for the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Network(_) | BridgeError::Io(_))
    }

    /// Whether this failure must abort the remaining scheduled downloads.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, BridgeError::StorageFull(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
