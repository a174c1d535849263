//! Index declarations
//!
//! An index is identified by its ordered tuple of property paths. Each
//! path either reads the flattened item directly (simple) or applies a
//! declared extractor to the whole item (computed). Extractors are never
//! persisted; on restart the declaration is matched to the stored index by
//! its `keys` tuple alone.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::keyspace::codec;

/// Extractor producing a computed index value from an item.
///
/// Returning `None` means the item has no value for this property and is
/// left out of the index.
pub type ComputeFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// How one index property obtains its value.
#[derive(Clone)]
pub enum IndexProperty {
    /// Read the flattened item at the property path
    Simple,
    /// Apply the extractor to the non-flattened item
    Computed(ComputeFn),
}

impl fmt::Debug for IndexProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexProperty::Simple => write!(f, "Simple"),
            IndexProperty::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// A declared secondary index.
#[derive(Debug, Clone)]
pub struct Index {
    keys: Vec<String>,
    properties: Vec<IndexProperty>,
    projection: Option<Vec<String>>,
}

impl Index {
    /// Declare an index over simple property paths.
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let properties = vec![IndexProperty::Simple; keys.len()];
        Self {
            keys,
            properties,
            projection: None,
        }
    }

    /// Append a computed property.
    ///
    /// The path is part of the index identity; the extractor supplies the
    /// value at write time.
    pub fn with_computed(
        mut self,
        key: impl Into<String>,
        compute: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.keys.push(key.into());
        self.properties.push(IndexProperty::Computed(Arc::new(compute)));
        self
    }

    /// Store the values at these paths inside each index entry, so reads
    /// asking only for them never fetch the item.
    pub fn with_projection(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.projection = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// The ordered property paths (index identity).
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Projection paths, if declared.
    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    /// Value source per key, parallel to `keys()`.
    pub(crate) fn properties(&self) -> &[IndexProperty] {
        &self.properties
    }

    /// The index name: its paths joined with `+`.
    pub fn name(&self) -> String {
        codec::index_name(&self.keys)
    }

    /// Whether the projection contains every requested path.
    pub(crate) fn projection_covers(&self, paths: &[String]) -> bool {
        match &self.projection {
            Some(projection) => paths.iter().all(|p| projection.contains(p)),
            None => false,
        }
    }
}
