//! Store Error Types
//!
//! Unified error handling for the document store.
//!
//! Error kinds:
//! - Configuration: bad construction options or operation arguments
//! - InvariantViolation: missing collection/index/descriptor, downgrade
//! - UnsupportedMigration: schema changes the store cannot perform
//! - TransactionMisuse: lifecycle operations called inside a transaction
//! - Backend: surfaced from the key-value engine

use thiserror::Error;

use crate::kv::KvError;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Unified error type for all store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid construction options or operation arguments
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A store invariant does not hold
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A schema change the store does not support
    #[error("unsupported migration: {0}")]
    UnsupportedMigration(String),

    /// Lifecycle operation invoked inside a transaction
    #[error("transaction misuse: {0}")]
    TransactionMisuse(String),

    /// Error surfaced from the key-value backend
    #[error(transparent)]
    Backend(#[from] KvError),
}

impl StoreError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create an unsupported migration error
    pub fn unsupported_migration(msg: impl Into<String>) -> Self {
        Self::UnsupportedMigration(msg.into())
    }

    /// Create a transaction misuse error
    pub fn transaction_misuse(msg: impl Into<String>) -> Self {
        Self::TransactionMisuse(msg.into())
    }

    /// Stable string code for logs and API surfaces
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::UnsupportedMigration(_) => "UNSUPPORTED_MIGRATION",
            Self::TransactionMisuse(_) => "TRANSACTION_MISUSE",
            Self::Backend(_) => "BACKEND",
        }
    }

    /// Returns true when the error is the benign-absence kind raised by
    /// `error_if_missing` / `error_if_exists` flags.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            Self::Backend(KvError::NotFound(_)) | Self::Backend(KvError::AlreadyExists(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::configuration("x").code(), "CONFIGURATION");
        assert_eq!(StoreError::invariant("x").code(), "INVARIANT_VIOLATION");
        assert_eq!(
            StoreError::unsupported_migration("x").code(),
            "UNSUPPORTED_MIGRATION"
        );
        assert_eq!(
            StoreError::transaction_misuse("x").code(),
            "TRANSACTION_MISUSE"
        );
    }

    #[test]
    fn test_backend_absence() {
        let err = StoreError::from(KvError::NotFound("[\"S\",\"People\",\"u1\"]".into()));
        assert!(err.is_absence());
        assert!(!StoreError::configuration("x").is_absence());
    }
}
