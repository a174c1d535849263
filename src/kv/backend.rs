//! KV backend contract
//!
//! The document store consumes an ordered key-value engine through these
//! traits. Keys are typed tuples (`KvKey`); the engine must order them
//! lexicographically per element with the `KeyElement` type order.
//!
//! Range bounds in a [`KvQuery`] are element tuples *relative to the
//! prefix*:
//! - `start`: suffix >= start
//! - `start_after`: suffix strictly greater than start_after
//! - `end`: suffix <= end, or suffix extends end (inclusive upper bound)
//! - `end_before`: suffix strictly less than end_before

use serde_json::Value;

use crate::keyspace::{KeyElement, KvKey};

use super::errors::KvResult;

/// Flags for [`KvHandle::put`].
#[derive(Debug, Clone, Copy)]
pub struct PutFlags {
    /// Create the key when absent (off means update-only)
    pub create_if_missing: bool,
    /// Error when the key already exists
    pub error_if_exists: bool,
}

impl Default for PutFlags {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

/// One result of a scan or multi-get.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    /// Full key tuple
    pub key: KvKey,
    /// Value, present only when values were requested
    pub value: Option<Value>,
}

/// A range query under a key prefix.
#[derive(Debug, Clone, Default)]
pub struct KvQuery {
    /// Tuple prefix all results must share
    pub prefix: KvKey,
    /// Inclusive lower bound, relative to the prefix
    pub start: Option<KvKey>,
    /// Exclusive lower bound, relative to the prefix
    pub start_after: Option<KvKey>,
    /// Inclusive upper bound, relative to the prefix
    pub end: Option<KvKey>,
    /// Exclusive upper bound, relative to the prefix
    pub end_before: Option<KvKey>,
    /// Return results in descending key order
    pub reverse: bool,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Whether to materialize values
    pub return_values: bool,
}

impl KvQuery {
    /// Query everything under a prefix.
    pub fn prefix(prefix: KvKey) -> Self {
        Self {
            prefix,
            ..Self::default()
        }
    }
}

/// Read/write operations available both on the base store and inside a
/// transaction.
pub trait KvHandle {
    /// Get the value at a key. Absence is an error only when
    /// `error_if_missing` is set.
    fn get(&self, key: &KvKey, error_if_missing: bool) -> KvResult<Option<Value>>;

    /// Put a value, honoring the create/exists flags.
    fn put(&self, key: &KvKey, value: &Value, flags: PutFlags) -> KvResult<()>;

    /// Delete a key. Returns whether a delete occurred.
    fn delete(&self, key: &KvKey, error_if_missing: bool) -> KvResult<bool>;

    /// Get several keys at once. Missing keys are skipped unless
    /// `error_if_missing` is set; values are materialized only when
    /// `return_values` is set.
    fn get_many(
        &self,
        keys: &[KvKey],
        error_if_missing: bool,
        return_values: bool,
    ) -> KvResult<Vec<KvEntry>>;

    /// Range scan under a prefix, in key order.
    fn find(&self, query: &KvQuery) -> KvResult<Vec<KvEntry>>;

    /// Number of keys the query matches.
    fn count(&self, query: &KvQuery) -> KvResult<u64>;

    /// Delete every key the query matches. Returns the number deleted.
    fn find_and_delete(&self, query: &KvQuery) -> KvResult<u64>;
}

/// A scoped transaction handle.
///
/// Dropping without commit discards the staged writes.
pub trait KvTransaction: KvHandle {
    /// Atomically apply all staged writes.
    fn commit(self: Box<Self>) -> KvResult<()>;

    /// Discard all staged writes.
    fn rollback(self: Box<Self>) -> KvResult<()>;
}

/// An ordered key-value engine.
pub trait KvBackend: KvHandle + Send + Sync {
    /// Open a transaction. Reads inside it observe its own writes.
    fn begin<'a>(&'a self) -> KvResult<Box<dyn KvTransaction + 'a>>;

    /// Release backend resources; subsequent operations fail.
    fn close(&self) -> KvResult<()>;
}

/// Whether `key` equals or extends `prefix`.
pub(crate) fn starts_with(key: &[KeyElement], prefix: &[KeyElement]) -> bool {
    key.len() >= prefix.len() && &key[..prefix.len()] == prefix
}

/// Whether a key inside the prefix region satisfies the query bounds.
pub(crate) fn within_bounds(key: &[KeyElement], query: &KvQuery) -> bool {
    let suffix = &key[query.prefix.len()..];
    if let Some(start) = &query.start {
        if suffix < start.as_slice() {
            return false;
        }
    }
    if let Some(start_after) = &query.start_after {
        if suffix <= start_after.as_slice() {
            return false;
        }
    }
    if let Some(end) = &query.end {
        if suffix > end.as_slice() && !starts_with(suffix, end) {
            return false;
        }
    }
    if let Some(end_before) = &query.end_before {
        if suffix >= end_before.as_slice() {
            return false;
        }
    }
    true
}
