//! Item and query operations
//!
//! All reads and writes funnel through here. Mutations run inside one KV
//! transaction together with their index updates. Reads with a query or an
//! order go through a secondary index; when the requested properties are
//! covered by the index projection, results come straight from the index
//! entries with zero item reads.

use serde_json::Value;

use crate::collection::{Collection, Index};
use crate::errors::{StoreError, StoreResult};
use crate::events::Event;
use crate::index::maintainer;
use crate::index::paths;
use crate::keyspace::{codec, ItemKey, KeyElement, KvKey};
use crate::kv::{KvEntry, KvError, KvQuery, PutFlags};
use crate::pacing::{Pacer, RESPIRATION_RATE};

use super::context::{Context, DocumentStore};
use super::options::{
    DeleteOptions, FindOptions, GetManyOptions, GetOptions, ItemEntry, Properties, PutOptions,
};

fn normalize_key(key: impl Into<ItemKey>) -> StoreResult<ItemKey> {
    let key = key.into();
    if !key.is_valid() {
        return Err(StoreError::configuration(
            "item key must be a non-empty string or a number",
        ));
    }
    Ok(key)
}

fn normalize_item(item: &Value) -> StoreResult<()> {
    if !item.is_object() {
        return Err(StoreError::configuration("item must be a record"));
    }
    Ok(())
}

fn bound_elements(values: &[Value]) -> StoreResult<KvKey> {
    values
        .iter()
        .map(|value| {
            KeyElement::from_json(value).ok_or_else(|| {
                StoreError::configuration("range bound values must be scalars")
            })
        })
        .collect()
}

fn entry_item_key(key: &KvKey) -> StoreResult<ItemKey> {
    key.last()
        .and_then(ItemKey::from_element)
        .ok_or_else(|| StoreError::invariant("scan returned a key without an item key element"))
}

/// Resume cursor for a batched scan: the last scanned key relative to the
/// scan prefix, as JSON values.
///
/// The key tuple encodes the query and order values regardless of which
/// properties the caller asked to materialize, so cursoring never depends
/// on the `properties` selection.
fn scan_cursor(query: &KvQuery, last: Option<&KvEntry>) -> Option<Vec<Value>> {
    last.map(|entry| {
        entry.key[query.prefix.len()..]
            .iter()
            .map(KeyElement::to_json)
            .collect()
    })
}

impl Context<'_> {
    fn kv_query(
        &self,
        prefix: KvKey,
        options: &FindOptions,
        return_values: bool,
    ) -> StoreResult<KvQuery> {
        Ok(KvQuery {
            prefix,
            start: options.start.as_deref().map(bound_elements).transpose()?,
            start_after: options
                .start_after
                .as_deref()
                .map(bound_elements)
                .transpose()?,
            end: options.end.as_deref().map(bound_elements).transpose()?,
            end_before: options
                .end_before
                .as_deref()
                .map(bound_elements)
                .transpose()?,
            reverse: options.reverse,
            limit: options.limit,
            return_values,
        })
    }

    /// Get one item.
    pub fn get(
        &self,
        collection: &str,
        key: impl Into<ItemKey>,
        options: &GetOptions,
    ) -> StoreResult<Option<Value>> {
        let key = normalize_key(key)?;
        self.ensure_initialized()?;
        self.store().registry().require(collection)?;
        let kv_key = codec::item_key(self.store().name(), collection, &key);
        Ok(self.kv().get(&kv_key, options.error_if_missing)?)
    }

    /// Whether an item exists.
    pub fn exists(&self, collection: &str, key: impl Into<ItemKey>) -> StoreResult<bool> {
        Ok(self
            .get(collection, key, &GetOptions::default())?
            .is_some())
    }

    /// Write one item and update every index differentially, atomically.
    pub fn put(
        &self,
        collection: &str,
        key: impl Into<ItemKey>,
        item: &Value,
        options: &PutOptions,
    ) -> StoreResult<()> {
        let key = normalize_key(key)?;
        normalize_item(item)?;
        self.ensure_initialized()?;
        let declared = self.store().registry().require(collection)?;
        let kv_key = codec::item_key(self.store().name(), collection, &key);
        let flags = PutFlags {
            create_if_missing: options.create_if_missing,
            error_if_exists: options.error_if_exists,
        };

        self.transaction(|tx| {
            let old = tx.kv().get(&kv_key, false)?;
            tx.kv().put(&kv_key, item, flags)?;
            maintainer::update_indexes(
                tx.kv(),
                tx.store().name(),
                declared,
                &key,
                old.as_ref(),
                Some(item),
            )?;
            tx.store().events().emit(&Event::DidPutItem {
                collection: collection.to_string(),
                key: key.clone(),
                item: item.clone(),
            });
            Ok(())
        })
    }

    /// Delete one item and its index entries, atomically.
    ///
    /// Returns whether a delete occurred.
    pub fn delete(
        &self,
        collection: &str,
        key: impl Into<ItemKey>,
        options: &DeleteOptions,
    ) -> StoreResult<bool> {
        let key = normalize_key(key)?;
        self.ensure_initialized()?;
        let declared = self.store().registry().require(collection)?;
        let kv_key = codec::item_key(self.store().name(), collection, &key);
        let error_if_missing = options.error_if_missing;

        self.transaction(|tx| {
            let old = tx.kv().get(&kv_key, false)?;
            let Some(old_item) = old else {
                if error_if_missing {
                    return Err(KvError::NotFound(format!(
                        "{}/{}",
                        collection, key
                    ))
                    .into());
                }
                return Ok(false);
            };
            tx.kv().delete(&kv_key, false)?;
            maintainer::update_indexes(
                tx.kv(),
                tx.store().name(),
                declared,
                &key,
                Some(&old_item),
                None,
            )?;
            tx.store().events().emit(&Event::DidDeleteItem {
                collection: collection.to_string(),
                key: key.clone(),
                old_item,
            });
            Ok(true)
        })
    }

    /// Get several items at once. Missing keys are skipped unless
    /// `error_if_missing` is set.
    pub fn get_many(
        &self,
        collection: &str,
        keys: &[ItemKey],
        options: &GetManyOptions,
    ) -> StoreResult<Vec<ItemEntry>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        for key in keys {
            if !key.is_valid() {
                return Err(StoreError::configuration(
                    "item key must be a non-empty string or a number",
                ));
            }
        }
        self.ensure_initialized()?;
        self.store().registry().require(collection)?;

        let return_values = options.properties.wants_values();
        let kv_keys: Vec<KvKey> = keys
            .iter()
            .map(|key| codec::item_key(self.store().name(), collection, key))
            .collect();
        let found = self
            .kv()
            .get_many(&kv_keys, options.error_if_missing, return_values)?;

        let mut pacer = Pacer::new();
        let mut out = Vec::with_capacity(found.len());
        for entry in found {
            out.push(ItemEntry {
                key: entry_item_key(&entry.key)?,
                value: entry.value,
            });
            pacer.breathe();
        }
        Ok(out)
    }

    /// Find items.
    ///
    /// Without a query or an order this is a plain scan over the
    /// collection. With either, the scan runs over the selected index.
    pub fn find(&self, collection: &str, options: &FindOptions) -> StoreResult<Vec<ItemEntry>> {
        Ok(self.find_batch(collection, options)?.0)
    }

    /// One scan batch plus the cursor of the last scanned key, for
    /// `for_each` resumption.
    fn find_batch(
        &self,
        collection: &str,
        options: &FindOptions,
    ) -> StoreResult<(Vec<ItemEntry>, Option<Vec<Value>>)> {
        self.ensure_initialized()?;
        let declared = self.store().registry().require(collection)?;
        if options.query.is_empty() && options.order.is_empty() {
            self.find_in_collection(declared, options)
        } else {
            self.find_with_index(declared, options)
        }
    }

    fn find_in_collection(
        &self,
        declared: &Collection,
        options: &FindOptions,
    ) -> StoreResult<(Vec<ItemEntry>, Option<Vec<Value>>)> {
        let prefix = codec::collection_prefix(self.store().name(), declared.name());
        let query = self.kv_query(prefix, options, options.properties.wants_values())?;
        let found = self.kv().find(&query)?;
        let cursor = scan_cursor(&query, found.last());

        let mut pacer = Pacer::new();
        let mut out = Vec::with_capacity(found.len());
        for entry in found {
            out.push(ItemEntry {
                key: entry_item_key(&entry.key)?,
                value: entry.value,
            });
            pacer.breathe();
        }
        Ok((out, cursor))
    }

    /// Select the index for the options and encode the query values, in
    /// index declaration order.
    fn select_index<'c>(
        &self,
        declared: &'c Collection,
        options: &FindOptions,
    ) -> StoreResult<(&'c Index, Vec<KeyElement>)> {
        let query_keys: Vec<&str> = options.query.iter().map(|(k, _)| k.as_str()).collect();
        let order: Vec<&str> = options.order.iter().map(String::as_str).collect();
        let index = declared.find_index_for_query_and_order(&query_keys, &order)?;
        tracing::debug!(
            collection = declared.name(),
            index = %index.name(),
            "selected index"
        );

        let mut values = Vec::with_capacity(options.query.len());
        for path in &index.keys()[..options.query.len()] {
            let (_, value) = options
                .query
                .iter()
                .find(|(k, _)| k == path)
                .ok_or_else(|| StoreError::invariant("selected index does not cover the query"))?;
            values.push(KeyElement::from_json(value).ok_or_else(|| {
                StoreError::configuration(format!(
                    "query value for '{}' has no key encoding",
                    path
                ))
            })?);
        }
        Ok((index, values))
    }

    fn find_with_index(
        &self,
        declared: &Collection,
        options: &FindOptions,
    ) -> StoreResult<(Vec<ItemEntry>, Option<Vec<Value>>)> {
        let (index, query_values) = self.select_index(declared, options)?;

        let requested = options.properties.as_paths();
        let use_projection = match requested {
            Some(paths) => index.projection_covers(paths),
            None => false,
        };
        let fetch_items = match &options.properties {
            Properties::All => true,
            Properties::None => false,
            Properties::Paths(paths) => !paths.is_empty() && !use_projection,
        };
        if fetch_items && requested.is_some() {
            tracing::debug!(
                collection = declared.name(),
                index = %index.name(),
                "requested properties not covered by the index projection; fetching items"
            );
        }

        let prefix = codec::index_query_prefix(
            self.store().name(),
            declared.name(),
            &index.name(),
            &query_values,
        );
        let query = self.kv_query(prefix, options, use_projection)?;
        let found = self.kv().find(&query)?;
        let cursor = scan_cursor(&query, found.last());

        let mut pacer = Pacer::new();
        let mut out = Vec::with_capacity(found.len());
        for entry in found {
            let key = entry_item_key(&entry.key)?;
            let value = if use_projection {
                // Stored null means the entry carries no projection.
                entry
                    .value
                    .filter(|v| !v.is_null())
                    .and_then(|record| match requested {
                        Some(paths) => paths::filter_record(&record, paths),
                        None => Some(record),
                    })
            } else {
                None
            };
            out.push(ItemEntry { key, value });
            pacer.breathe();
        }

        if fetch_items {
            let keys: Vec<ItemKey> = out.into_iter().map(|e| e.key).collect();
            let fetched = self.get_many(
                declared.name(),
                &keys,
                &GetManyOptions {
                    error_if_missing: false,
                    properties: options.properties.clone(),
                },
            )?;
            return Ok((fetched, cursor));
        }
        Ok((out, cursor))
    }

    /// Count the items a find with the same options would visit.
    ///
    /// `reverse` and `properties` do not apply.
    pub fn count(&self, collection: &str, options: &FindOptions) -> StoreResult<u64> {
        self.ensure_initialized()?;
        let declared = self.store().registry().require(collection)?;
        let prefix = if options.query.is_empty() && options.order.is_empty() {
            codec::collection_prefix(self.store().name(), declared.name())
        } else {
            let (index, query_values) = self.select_index(declared, options)?;
            codec::index_query_prefix(
                self.store().name(),
                declared.name(),
                &index.name(),
                &query_values,
            )
        };
        let mut query = self.kv_query(prefix, options, false)?;
        query.reverse = false;
        Ok(self.kv().count(&query)?)
    }

    /// Visit items in batches, resuming each batch after the last scanned
    /// key. Returns the number of items visited.
    pub fn for_each(
        &self,
        collection: &str,
        options: &FindOptions,
        mut f: impl FnMut(ItemEntry) -> StoreResult<()>,
    ) -> StoreResult<u64> {
        self.ensure_initialized()?;
        let batch_size = options.batch_size.unwrap_or(RESPIRATION_RATE);
        if batch_size == 0 {
            return Err(StoreError::configuration("batch size must be positive"));
        }
        if options.reverse {
            // The resume cursor is a lower bound; it cannot drive a
            // descending scan.
            return Err(StoreError::configuration(
                "for_each cannot scan in reverse",
            ));
        }
        let mut batch_options = options.clone();
        batch_options.limit = Some(batch_size);
        batch_options.batch_size = None;

        let mut visited = 0u64;
        loop {
            let (batch, cursor) = self.find_batch(collection, &batch_options)?;
            // No cursor means the scan itself came up empty.
            let Some(cursor) = cursor else {
                return Ok(visited);
            };
            for entry in batch {
                f(entry)?;
                visited += 1;
            }
            batch_options.start = None;
            batch_options.start_after = Some(cursor);
        }
    }

    /// Delete every item a find with these options would visit.
    ///
    /// Returns the number of items deleted.
    pub fn find_and_delete(&self, collection: &str, options: &FindOptions) -> StoreResult<u64> {
        let mut scan_options = options.clone();
        scan_options.properties = Properties::None;
        let mut deleted = 0u64;
        self.for_each(collection, &scan_options, |entry| {
            if self.delete(
                collection,
                entry.key,
                &DeleteOptions {
                    error_if_missing: false,
                },
            )? {
                deleted += 1;
            }
            Ok(())
        })?;
        Ok(deleted)
    }
}

impl DocumentStore {
    /// Get one item. See [`Context::get`].
    pub fn get(
        &self,
        collection: &str,
        key: impl Into<ItemKey>,
        options: &GetOptions,
    ) -> StoreResult<Option<Value>> {
        self.context().get(collection, key, options)
    }

    /// Whether an item exists.
    pub fn exists(&self, collection: &str, key: impl Into<ItemKey>) -> StoreResult<bool> {
        self.context().exists(collection, key)
    }

    /// Write one item. See [`Context::put`].
    pub fn put(
        &self,
        collection: &str,
        key: impl Into<ItemKey>,
        item: &Value,
        options: &PutOptions,
    ) -> StoreResult<()> {
        self.context().put(collection, key, item, options)
    }

    /// Delete one item. See [`Context::delete`].
    pub fn delete(
        &self,
        collection: &str,
        key: impl Into<ItemKey>,
        options: &DeleteOptions,
    ) -> StoreResult<bool> {
        self.context().delete(collection, key, options)
    }

    /// Get several items. See [`Context::get_many`].
    pub fn get_many(
        &self,
        collection: &str,
        keys: &[ItemKey],
        options: &GetManyOptions,
    ) -> StoreResult<Vec<ItemEntry>> {
        self.context().get_many(collection, keys, options)
    }

    /// Find items. See [`Context::find`].
    pub fn find(&self, collection: &str, options: &FindOptions) -> StoreResult<Vec<ItemEntry>> {
        self.context().find(collection, options)
    }

    /// Count items. See [`Context::count`].
    pub fn count(&self, collection: &str, options: &FindOptions) -> StoreResult<u64> {
        self.context().count(collection, options)
    }

    /// Visit items in batches. See [`Context::for_each`].
    pub fn for_each(
        &self,
        collection: &str,
        options: &FindOptions,
        f: impl FnMut(ItemEntry) -> StoreResult<()>,
    ) -> StoreResult<u64> {
        self.context().for_each(collection, options, f)
    }

    /// Delete matching items. See [`Context::find_and_delete`].
    pub fn find_and_delete(&self, collection: &str, options: &FindOptions) -> StoreResult<u64> {
        self.context().find_and_delete(collection, options)
    }
}
