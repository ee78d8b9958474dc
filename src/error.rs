//! Error types for the cache store
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Store Error Enum ==
/// Unified error type for the cache store and its backends.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A stored payload failed structural validation
    #[error("Corrupt entry at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Construction arguments were rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested backend kind is not one this crate knows
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Entry could not be serialized for a string medium
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure signalled by a backend adapter
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns the key of a corrupt record, if this error reports one.
    pub fn corrupt_key(&self) -> Option<&str> {
        match self {
            StoreError::Corrupt { key, .. } => Some(key),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache store.
pub type Result<T> = std::result::Result<T, StoreError>;
