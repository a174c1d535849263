//! Declared collections and index selection
//!
//! The registry is the in-memory set of collection declarations. It is
//! frozen after store construction; changing declarations means building a
//! new store handle.

use crate::errors::{StoreError, StoreResult};

use super::index::Index;

/// A declared collection: a name and its ordered index declarations.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    indexes: Vec<Index>,
}

impl Collection {
    /// Declare a collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    /// Append an index declaration.
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared indexes, in declaration order.
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// The declared index with exactly these key paths, if any.
    pub(crate) fn index_with_keys(&self, keys: &[String]) -> Option<&Index> {
        self.indexes.iter().find(|index| index.keys() == keys)
    }

    /// Select the index serving a (query, order) pair.
    ///
    /// The first declared index whose `keys` prefix consists of all query
    /// keys (in any order) followed by the order keys (in the given order)
    /// wins; declaration order breaks ties.
    pub(crate) fn find_index_for_query_and_order(
        &self,
        query_keys: &[&str],
        order: &[&str],
    ) -> StoreResult<&Index> {
        let needed = query_keys.len() + order.len();
        for index in &self.indexes {
            if index.keys().len() < needed {
                continue;
            }
            let head = &index.keys()[..query_keys.len()];
            let head_matches = head.iter().all(|k| query_keys.contains(&k.as_str()))
                && query_keys.iter().all(|q| head.iter().any(|k| k == q));
            let tail = &index.keys()[query_keys.len()..needed];
            let tail_matches = tail.iter().map(String::as_str).eq(order.iter().copied());
            if head_matches && tail_matches {
                return Ok(index);
            }
        }
        Err(StoreError::invariant(format!(
            "no index on collection '{}' serves query keys [{}] with order [{}]",
            self.name,
            query_keys.join(", "),
            order.join(", ")
        )))
    }
}

/// In-memory set of declared collections.
#[derive(Debug, Default)]
pub(crate) struct CollectionRegistry {
    collections: Vec<Collection>,
}

impl CollectionRegistry {
    /// Build a registry, rejecting duplicate collection names.
    pub fn new(collections: Vec<Collection>) -> StoreResult<Self> {
        let mut registry = Self::default();
        for collection in collections {
            registry.add_collection(collection)?;
        }
        Ok(registry)
    }

    fn add_collection(&mut self, collection: Collection) -> StoreResult<()> {
        if self.get(collection.name()).is_some() {
            return Err(StoreError::configuration(format!(
                "duplicate collection '{}'",
                collection.name()
            )));
        }
        self.collections.push(collection);
        Ok(())
    }

    /// Look up a declared collection.
    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.name() == name)
    }

    /// Look up a declared collection, erroring with the requested name.
    pub fn require(&self, name: &str) -> StoreResult<&Collection> {
        self.get(name)
            .ok_or_else(|| StoreError::invariant(format!("collection '{}' not found", name)))
    }

    /// Declared collections, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Collection> {
        self.collections.iter()
    }
}
