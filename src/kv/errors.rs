//! KV backend error types

use thiserror::Error;

/// KV backend result type
pub type KvResult<T> = Result<T, KvError>;

/// Errors surfaced by a key-value backend.
#[derive(Debug, Error)]
pub enum KvError {
    /// Key not present and `error_if_missing` was set
    #[error("key not found: {0}")]
    NotFound(String),

    /// Key already present and `error_if_exists` was set
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// Operation on a closed backend
    #[error("backend is closed")]
    Closed,

    /// Backend-internal failure
    #[error("backend failure: {0}")]
    Internal(String),
}

impl KvError {
    /// Create an internal backend error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
