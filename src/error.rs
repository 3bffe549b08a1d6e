//! Error types for the list reconcilers.

use crate::types::RoomId;
use thiserror::Error;

/// Main error type for reconciler operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Protocol violations (fail fast) ---
    #[error("{op} index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        op: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    // --- Transient upstream failures ---
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Failed to send message: {0}")]
    SendFailed(String),

    #[error("Back pagination failed: {0}")]
    PaginationFailed(String),

    // --- Lifecycle ---
    #[error("Reconciler faulted: {0}")]
    Faulted(String),

    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("Session is logged out")]
    LoggedOut,
}

impl Error {
    /// True for errors that indicate the reconciled sequence can no longer be
    /// trusted.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::IndexOutOfBounds { .. } | Error::Decode(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

/// Result type for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;
