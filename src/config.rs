//! Store construction options

use std::time::Duration;

use crate::collection::Collection;
use crate::errors::{StoreError, StoreResult};

/// How long a blocked initializer waits before re-reading the lock.
pub const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5000);

/// Options for opening a document store.
#[derive(Debug)]
pub struct StoreOptions {
    /// Store identifier; the root of this store's key space
    pub name: String,
    /// Backend locator, e.g. `memory://`
    pub url: String,
    /// Declared collections, in declaration order
    pub collections: Vec<Collection>,
    /// Poll interval of the schema lock loop
    pub lock_retry_interval: Duration,
}

impl StoreOptions {
    /// Create options with the required fields.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            collections: Vec::new(),
            lock_retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
        }
    }

    /// Append a collection declaration.
    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.collections.push(collection);
        self
    }

    /// Override the schema lock poll interval.
    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        if self.name.is_empty() {
            return Err(StoreError::configuration("store name is required"));
        }
        if self.url.is_empty() {
            return Err(StoreError::configuration("backend url is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = StoreOptions::new("S", "memory://");
        assert_eq!(options.lock_retry_interval, DEFAULT_LOCK_RETRY_INTERVAL);
        assert!(options.collections.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_missing_name_rejected() {
        assert!(StoreOptions::new("", "memory://").validate().is_err());
        assert!(StoreOptions::new("S", "").validate().is_err());
    }
}
