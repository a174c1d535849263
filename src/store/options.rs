//! Per-operation options
//!
//! Each operation takes a small record of enumerated fields. `properties`
//! selects which item properties a read materializes: everything, nothing
//! (keys only), or an explicit list of paths.

use serde_json::Value;

use crate::keyspace::ItemKey;

/// Which properties a read returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Properties {
    /// Every property (the whole item)
    All,
    /// No properties: results carry keys only
    #[default]
    None,
    /// An explicit ordered list of property paths
    Paths(Vec<String>),
}

impl Properties {
    /// Convenience constructor for `Paths`.
    pub fn paths(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Properties::Paths(paths.into_iter().map(Into::into).collect())
    }

    /// Whether this selection requires values at all.
    pub(crate) fn wants_values(&self) -> bool {
        match self {
            Properties::All => true,
            Properties::None => false,
            Properties::Paths(paths) => !paths.is_empty(),
        }
    }

    /// The explicit paths, when non-empty.
    pub(crate) fn as_paths(&self) -> Option<&[String]> {
        match self {
            Properties::Paths(paths) if !paths.is_empty() => Some(paths),
            _ => None,
        }
    }
}

/// One result of a read: the item key and, when requested, a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemEntry {
    /// Item key (the last element of the KV key)
    pub key: ItemKey,
    /// Item, projection, or restricted record, depending on the read
    pub value: Option<Value>,
}

/// Options for `get`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Error when the item is missing instead of returning nothing
    pub error_if_missing: bool,
}

/// Options for `put`.
#[derive(Debug, Clone, Copy)]
pub struct PutOptions {
    /// Create the item when absent (off means update-only)
    pub create_if_missing: bool,
    /// Error when the item already exists
    pub error_if_exists: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

/// Options for `delete`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Error when the item is missing
    pub error_if_missing: bool,
}

/// Options for `get_many`.
#[derive(Debug, Clone, Default)]
pub struct GetManyOptions {
    /// Error on the first missing key instead of skipping it
    pub error_if_missing: bool,
    /// Which properties to materialize
    pub properties: Properties,
}

/// Options for `find`, `count`, `for_each`, and `find_and_delete`.
///
/// With a query or an order, the scan runs over a secondary index and the
/// range bounds are tuples under the index prefix; otherwise the scan runs
/// over the items themselves and the bounds are item keys.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Equality constraints, as (property path, value) pairs
    pub query: Vec<(String, Value)>,
    /// Properties the results are ordered by
    pub order: Vec<String>,
    /// Inclusive lower bound, relative to the scan prefix
    pub start: Option<Vec<Value>>,
    /// Exclusive lower bound, relative to the scan prefix
    pub start_after: Option<Vec<Value>>,
    /// Inclusive upper bound, relative to the scan prefix
    pub end: Option<Vec<Value>>,
    /// Exclusive upper bound, relative to the scan prefix
    pub end_before: Option<Vec<Value>>,
    /// Scan in descending key order (ignored by `count`)
    pub reverse: bool,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Which properties to materialize (ignored by `count`)
    pub properties: Properties,
    /// Batch size for `for_each` (defaults to the respiration rate)
    pub batch_size: Option<usize>,
}

impl FindOptions {
    /// Empty options: full scan, keys only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one equality constraint.
    pub fn with_query(mut self, path: impl Into<String>, value: Value) -> Self {
        self.query.push((path.into(), value));
        self
    }

    /// Order results by these properties.
    pub fn with_order(mut self, order: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Select which properties to return.
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Inclusive lower bound.
    pub fn with_start(mut self, start: Vec<Value>) -> Self {
        self.start = Some(start);
        self
    }

    /// Exclusive lower bound.
    pub fn with_start_after(mut self, start_after: Vec<Value>) -> Self {
        self.start_after = Some(start_after);
        self
    }

    /// Inclusive upper bound.
    pub fn with_end(mut self, end: Vec<Value>) -> Self {
        self.end = Some(end);
        self
    }

    /// Exclusive upper bound.
    pub fn with_end_before(mut self, end_before: Vec<Value>) -> Self {
        self.end_before = Some(end_before);
        self
    }

    /// Scan in descending order.
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Cap the number of results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Batch size for `for_each`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}
