//! Error types for the Redlimit crate.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Redlimit operations.
#[derive(Error, Debug)]
pub enum RedlimitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The check-and-increment procedure could not be loaded
    #[error("Failed to load procedure from {path}: {reason}")]
    ScriptLoad { path: String, reason: String },

    /// The counter store could not serve the request
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    /// The store replied with something other than a non-negative integer
    #[error("Unexpected reply from counter store: {0}")]
    ProtocolMismatch(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RedlimitError {
    /// Whether the error means the store could not be reached in time.
    ///
    /// Callers use this to pick fail-open or fail-closed behaviour.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, RedlimitError::Store(e) if e.is_unavailable())
    }
}

/// Result type alias for Redlimit operations.
pub type Result<T> = std::result::Result<T, RedlimitError>;
