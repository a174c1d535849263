//! Persisted store descriptor
//!
//! The descriptor is a single JSON record at the store's root key. It
//! carries the schema version, the migration lock flag, and one entry per
//! collection ever declared. Collection entries are only tombstoned, never
//! silently dropped. Computed-value metadata is not persisted; an index is
//! identified by its `keys` tuple alone.

use serde::{Deserialize, Serialize};

use crate::collection::{Collection, Index};
use crate::collection::registry::CollectionRegistry;

/// Current descriptor schema version.
pub const VERSION: u64 = 3;

/// Persisted form of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Ordered property paths (the index identity)
    pub keys: Vec<String>,
    /// Projection paths stored in each entry value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Vec<String>>,
}

impl From<&Index> for IndexDescriptor {
    fn from(index: &Index) -> Self {
        Self {
            keys: index.keys().to_vec(),
            projection: index.projection().map(<[String]>::to_vec),
        }
    }
}

/// Persisted form of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    /// Collection name, unique within the store
    pub name: String,
    /// Tombstone: data purged, descriptor retained
    #[serde(default, rename = "hasBeenRemoved")]
    pub has_been_removed: bool,
    /// Persisted indexes, in declaration order
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
}

impl From<&Collection> for CollectionDescriptor {
    fn from(collection: &Collection) -> Self {
        Self {
            name: collection.name().to_string(),
            has_been_removed: false,
            indexes: collection.indexes().iter().map(IndexDescriptor::from).collect(),
        }
    }
}

/// The persisted store descriptor.
///
/// `collections` accepts its pre-rename field name `tables` so version-1
/// descriptors can be read during upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    /// Store identifier
    pub name: String,
    /// Descriptor schema version
    pub version: u64,
    /// Migration lock flag
    #[serde(default, rename = "isLocked")]
    pub is_locked: bool,
    /// One entry per collection ever declared
    #[serde(default, alias = "tables")]
    pub collections: Vec<CollectionDescriptor>,
}

impl StoreDescriptor {
    /// Descriptor for a freshly created store: the declared collections at
    /// the current version, unlocked.
    pub(crate) fn from_declared(name: &str, registry: &CollectionRegistry) -> Self {
        Self {
            name: name.to_string(),
            version: VERSION,
            is_locked: false,
            collections: registry.iter().map(CollectionDescriptor::from).collect(),
        }
    }

    /// Position of a collection entry by name.
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.collections.iter().position(|c| c.name == name)
    }
}
