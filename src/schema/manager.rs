//! Schema lifecycle
//!
//! First use of a store walks a fixed sequence: create the descriptor if
//! missing, otherwise lock it, upgrade its version, verify, migrate the
//! declared collections and indexes against it, and unlock. The lock is
//! advisory between cooperating initializers: a blocked process polls
//! until the holder clears the flag. Unlock runs on every exit path.
//!
//! Migration is idempotent: a second run with identical declarations
//! performs zero writes and emits no migration events.

use std::thread;

use serde_json::Value;

use crate::collection::{Collection, Index};
use crate::errors::{StoreError, StoreResult};
use crate::events::Event;
use crate::index::maintainer;
use crate::keyspace::codec;
use crate::kv::{KvQuery, PutFlags};
use crate::pacing::Pacer;
use crate::store::context::DocumentStore;
use crate::store::options::{FindOptions, Properties};

use super::descriptor::{CollectionDescriptor, IndexDescriptor, StoreDescriptor, VERSION};

/// Runs descriptor creation, locking, upgrade, and migration for one
/// store handle.
pub(crate) struct SchemaManager<'a> {
    store: &'a DocumentStore,
}

impl<'a> SchemaManager<'a> {
    pub fn new(store: &'a DocumentStore) -> Self {
        Self { store }
    }

    /// Bring the persisted descriptor in line with the declarations.
    ///
    /// Called exactly once per handle, by the initialization state
    /// machine. A freshly created store needs no lock or migration.
    pub fn initialize(&self) -> StoreResult<()> {
        if self.create_if_missing()? {
            return Ok(());
        }
        self.acquire_lock()?;
        let result = self
            .upgrade()
            .and_then(|_| self.verify())
            .and_then(|_| self.migrate());
        let unlock = self.release_lock();
        result?;
        unlock
    }

    /// Write the descriptor for the declared collections when none exists.
    /// Returns whether a creation occurred.
    fn create_if_missing(&self) -> StoreResult<bool> {
        let key = codec::store_key(self.store.name());
        self.store.context().transaction(|tx| {
            if tx.kv().get(&key, false)?.is_some() {
                return Ok(false);
            }
            let descriptor = StoreDescriptor::from_declared(self.store.name(), self.store.registry());
            tx.kv()
                .put(&key, &to_raw(&descriptor)?, PutFlags::default())?;
            tracing::info!(store = self.store.name(), "created store descriptor");
            self.store.events().emit(&Event::DidCreate);
            Ok(true)
        })
    }

    /// Test-and-set the descriptor lock, polling until it is free.
    ///
    /// No timeout: a stuck lock must be cleared by an operator.
    fn acquire_lock(&self) -> StoreResult<()> {
        let key = codec::store_key(self.store.name());
        loop {
            let acquired = self.store.context().transaction(|tx| {
                let mut raw = tx
                    .kv()
                    .get(&key, false)?
                    .ok_or_else(|| StoreError::invariant("store descriptor missing"))?;
                let fields = raw
                    .as_object_mut()
                    .ok_or_else(|| StoreError::invariant("store descriptor is not a record"))?;
                if fields.get("isLocked").and_then(Value::as_bool).unwrap_or(false) {
                    return Ok(false);
                }
                fields.insert("isLocked".to_string(), Value::Bool(true));
                tx.kv().put(&key, &raw, PutFlags::default())?;
                Ok(true)
            })?;
            if acquired {
                return Ok(());
            }
            tracing::warn!(
                store = self.store.name(),
                "store descriptor is locked by another initializer; retrying"
            );
            thread::sleep(self.store.lock_retry_interval());
        }
    }

    /// Clear the descriptor lock. Runs on every initialize exit path.
    fn release_lock(&self) -> StoreResult<()> {
        let key = codec::store_key(self.store.name());
        self.store.context().transaction(|tx| {
            let mut raw = tx
                .kv()
                .get(&key, false)?
                .ok_or_else(|| StoreError::invariant("store descriptor missing"))?;
            let fields = raw
                .as_object_mut()
                .ok_or_else(|| StoreError::invariant("store descriptor is not a record"))?;
            fields.insert("isLocked".to_string(), Value::Bool(false));
            tx.kv().put(&key, &raw, PutFlags::default())?;
            Ok(())
        })
    }

    /// Bring the descriptor to the current version.
    ///
    /// Works on the raw record because pre-rename descriptors do not parse
    /// into the typed form. A persisted version newer than this build is
    /// fatal; so is any version the automatic path cannot reach.
    fn upgrade(&self) -> StoreResult<()> {
        let key = codec::store_key(self.store.name());
        let handle = self.store.base_handle();
        let mut raw = handle
            .get(&key, false)?
            .ok_or_else(|| StoreError::invariant("store descriptor missing"))?;
        let version = raw
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::invariant("store descriptor has no version"))?;

        if version > VERSION {
            return Err(StoreError::invariant(format!(
                "store version {} is newer than supported version {}",
                version, VERSION
            )));
        }
        if version == VERSION {
            return Ok(());
        }

        self.store
            .events()
            .emit(&Event::UpgradeDidStart { from_version: version });
        tracing::info!(
            store = self.store.name(),
            from = version,
            to = VERSION,
            "upgrading store descriptor"
        );

        if version < 2 {
            let fields = raw
                .as_object_mut()
                .ok_or_else(|| StoreError::invariant("store descriptor is not a record"))?;
            fields.remove("lastMigrationNumber");
            if let Some(tables) = fields.remove("tables") {
                fields.entry("collections".to_string()).or_insert(tables);
            }
            if let Some(collections) = fields
                .get_mut("collections")
                .and_then(Value::as_array_mut)
            {
                for collection in collections {
                    if let Some(indexes) =
                        collection.get_mut("indexes").and_then(Value::as_array_mut)
                    {
                        for index in indexes.iter_mut() {
                            if let Some(name) = index.get("name").and_then(Value::as_str) {
                                *index = Value::String(name.to_string());
                            }
                        }
                    }
                }
            }
            handle.put(&key, &raw, PutFlags::default())?;
        }

        if version < 3 {
            return Err(StoreError::unsupported_migration(format!(
                "cannot automatically upgrade store from version {} to {}",
                version, VERSION
            )));
        }

        self.store.events().emit(&Event::UpgradeDidStop);
        Ok(())
    }

    /// Reserved consistency hook.
    fn verify(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Reconcile declared collections and indexes against the descriptor.
    fn migrate(&self) -> StoreResult<()> {
        let mut descriptor = self.load()?;
        let mut started = false;
        let result = self.migrate_collections(&mut descriptor, &mut started);
        if started {
            self.store.events().emit(&Event::MigrationDidStop);
        }
        result
    }

    fn note_change(&self, started: &mut bool) {
        if !*started {
            *started = true;
            self.store.events().emit(&Event::MigrationDidStart);
        }
    }

    fn migrate_collections(
        &self,
        descriptor: &mut StoreDescriptor,
        started: &mut bool,
    ) -> StoreResult<()> {
        for declared in self.store.registry().iter() {
            match descriptor.position(declared.name()) {
                None => {
                    self.note_change(started);
                    tracing::info!(collection = declared.name(), "adding collection");
                    descriptor.collections.push(CollectionDescriptor::from(declared));
                    self.save(descriptor)?;
                }
                Some(pos) if descriptor.collections[pos].has_been_removed => {
                    return Err(StoreError::unsupported_migration(format!(
                        "collection '{}' was removed and cannot be declared again",
                        declared.name()
                    )));
                }
                Some(pos) => {
                    self.migrate_indexes(descriptor, pos, declared, started)?;
                }
            }
        }

        // Live persisted collections with no declaration are tombstoned;
        // their items stay until removed collections are purged.
        let undeclared: Vec<usize> = descriptor
            .collections
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.has_been_removed && self.store.registry().get(&c.name).is_none())
            .map(|(i, _)| i)
            .collect();
        for pos in undeclared {
            self.note_change(started);
            let name = descriptor.collections[pos].name.clone();
            tracing::info!(collection = %name, "marking collection removed");
            let stale: Vec<Vec<String>> = descriptor.collections[pos]
                .indexes
                .iter()
                .map(|i| i.keys.clone())
                .collect();
            for keys in stale {
                self.remove_index(&name, &keys)?;
            }
            descriptor.collections[pos].indexes.clear();
            descriptor.collections[pos].has_been_removed = true;
            self.save(descriptor)?;
        }

        Ok(())
    }

    fn migrate_indexes(
        &self,
        descriptor: &mut StoreDescriptor,
        pos: usize,
        declared: &Collection,
        started: &mut bool,
    ) -> StoreResult<()> {
        for index in declared.indexes() {
            let exists = descriptor.collections[pos]
                .indexes
                .iter()
                .any(|p| p.keys == index.keys());
            if !exists {
                self.note_change(started);
                tracing::info!(
                    collection = declared.name(),
                    index = %index.name(),
                    "building index"
                );
                self.add_index(declared, index)?;
                descriptor.collections[pos]
                    .indexes
                    .push(IndexDescriptor::from(index));
                self.save(descriptor)?;
            }
        }

        let stale: Vec<Vec<String>> = descriptor.collections[pos]
            .indexes
            .iter()
            .filter(|p| declared.index_with_keys(&p.keys).is_none())
            .map(|p| p.keys.clone())
            .collect();
        for keys in stale {
            self.note_change(started);
            tracing::info!(
                collection = declared.name(),
                index = %codec::index_name(&keys),
                "removing index"
            );
            self.remove_index(declared.name(), &keys)?;
            descriptor.collections[pos].indexes.retain(|p| p.keys != keys);
            self.save(descriptor)?;
        }

        Ok(())
    }

    /// Build one index by scanning the collection sequentially.
    fn add_index(&self, collection: &Collection, index: &Index) -> StoreResult<()> {
        let ctx = self.store.context();
        let options = FindOptions::new().with_properties(Properties::All);
        let mut pacer = Pacer::new();
        ctx.for_each(collection.name(), &options, |entry| {
            let item = entry
                .value
                .ok_or_else(|| StoreError::invariant("collection scan returned no item"))?;
            maintainer::update_index(
                ctx.kv(),
                self.store.name(),
                collection.name(),
                &entry.key,
                None,
                Some(&item),
                index,
            )?;
            pacer.breathe();
            Ok(())
        })?;
        Ok(())
    }

    /// Drop one index by deleting its entire key range.
    fn remove_index(&self, collection: &str, keys: &[String]) -> StoreResult<()> {
        let prefix = codec::index_prefix(self.store.name(), collection, &codec::index_name(keys));
        self.store
            .base_handle()
            .find_and_delete(&KvQuery::prefix(prefix))?;
        Ok(())
    }

    /// Purge the data of tombstoned collections and drop their
    /// descriptors.
    pub fn remove_collections_marked_as_removed(&self) -> StoreResult<()> {
        let mut descriptor = self.load()?;
        let removed: Vec<String> = descriptor
            .collections
            .iter()
            .filter(|c| c.has_been_removed)
            .map(|c| c.name.clone())
            .collect();
        if removed.is_empty() {
            return Ok(());
        }
        for name in &removed {
            tracing::info!(collection = %name, "purging removed collection");
            let prefix = codec::collection_prefix(self.store.name(), name);
            self.store
                .base_handle()
                .find_and_delete(&KvQuery::prefix(prefix))?;
        }
        descriptor.collections.retain(|c| !c.has_been_removed);
        self.save(&descriptor)
    }

    fn load(&self) -> StoreResult<StoreDescriptor> {
        let key = codec::store_key(self.store.name());
        let raw = self
            .store
            .base_handle()
            .get(&key, false)?
            .ok_or_else(|| StoreError::invariant("store descriptor missing"))?;
        serde_json::from_value(raw)
            .map_err(|e| StoreError::invariant(format!("store descriptor is malformed: {}", e)))
    }

    fn save(&self, descriptor: &StoreDescriptor) -> StoreResult<()> {
        let key = codec::store_key(self.store.name());
        self.store
            .base_handle()
            .put(&key, &to_raw(descriptor)?, PutFlags::default())?;
        Ok(())
    }
}

fn to_raw(descriptor: &StoreDescriptor) -> StoreResult<Value> {
    serde_json::to_value(descriptor)
        .map_err(|e| StoreError::invariant(format!("store descriptor is not serializable: {}", e)))
}
