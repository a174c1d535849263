//! Store handle and ambient transaction context
//!
//! A `DocumentStore` is the root handle. Every operation actually runs on
//! a [`Context`], which carries the KV handle in scope: the base store, or
//! a transaction opened by [`Context::transaction`]. Nested transactions
//! are flattened — inside a transaction, `transaction(f)` runs `f` on the
//! same context.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::collection::CollectionRegistry;
use crate::config::StoreOptions;
use crate::errors::{StoreError, StoreResult};
use crate::events::{Event, EventBus};
use crate::keyspace::codec;
use crate::kv::{KvBackend, KvHandle, KvQuery, MemoryBackend};
use crate::schema::manager::SchemaManager;

/// Per-process initialization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Uninitialized,
    Initializing,
    Initialized,
}

pub(crate) struct StoreInner {
    name: String,
    backend: Arc<dyn KvBackend>,
    registry: CollectionRegistry,
    events: EventBus,
    init: Mutex<InitState>,
    lock_retry_interval: Duration,
}

/// A document store overlay on an ordered KV engine.
///
/// Cloning the handle is cheap; clones share the backend, the declared
/// collections, and the initialization state.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("name", &self.inner.name)
            .finish()
    }
}

impl DocumentStore {
    /// Open a store, resolving the backend from the options URL.
    ///
    /// `memory:` URLs construct the bundled in-memory engine; other
    /// schemes are rejected. Use [`DocumentStore::with_backend`] to attach
    /// an external engine.
    pub fn open(options: StoreOptions) -> StoreResult<Self> {
        options.validate()?;
        if !options.url.starts_with("memory:") {
            return Err(StoreError::configuration(format!(
                "unsupported backend url '{}'",
                options.url
            )));
        }
        let backend = Arc::new(MemoryBackend::new());
        Self::with_backend(options, backend)
    }

    /// Open a store on an already-constructed backend.
    pub fn with_backend(
        options: StoreOptions,
        backend: Arc<dyn KvBackend>,
    ) -> StoreResult<Self> {
        options.validate()?;
        let registry = CollectionRegistry::new(options.collections)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                name: options.name,
                backend,
                registry,
                events: EventBus::new(),
                init: Mutex::new(InitState::Uninitialized),
                lock_retry_interval: options.lock_retry_interval,
            }),
        })
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Names of the declared collections, in declaration order.
    pub fn collection_names(&self) -> Vec<String> {
        self.inner
            .registry
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Register a lifecycle event listener.
    pub fn subscribe(&self, listener: impl Fn(&Event) + Send + Sync + 'static) {
        self.inner.events.subscribe(listener);
    }

    /// Initialize the store: create or reconcile the persisted schema.
    ///
    /// Idempotent; every operation calls this implicitly.
    pub fn initialize(&self) -> StoreResult<()> {
        self.context().ensure_initialized()
    }

    /// Run `f` inside one KV transaction.
    ///
    /// Commits when `f` returns Ok, rolls back on Err.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Context<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.context().transaction(f)
    }

    /// Delete everything this store persisted and reset the handle to its
    /// uninitialized state. Forbidden inside a transaction.
    pub fn destroy_all(&self) -> StoreResult<()> {
        self.context().destroy_all()
    }

    /// Purge the data of tombstoned collections and drop their
    /// descriptors.
    pub fn remove_collections_marked_as_removed(&self) -> StoreResult<()> {
        self.context().ensure_initialized()?;
        SchemaManager::new(self).remove_collections_marked_as_removed()
    }

    /// Close the underlying backend.
    pub fn close(&self) -> StoreResult<()> {
        self.inner.backend.close()?;
        Ok(())
    }

    pub(crate) fn context(&self) -> Context<'_> {
        Context {
            store: self,
            txn: None,
        }
    }

    pub(crate) fn registry(&self) -> &CollectionRegistry {
        &self.inner.registry
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub(crate) fn base_handle(&self) -> &dyn KvHandle {
        let backend: &dyn KvBackend = self.inner.backend.as_ref();
        backend
    }

    pub(crate) fn lock_retry_interval(&self) -> Duration {
        self.inner.lock_retry_interval
    }
}

/// The ambient scope of one operation: the store plus the KV handle every
/// read and write goes through.
pub struct Context<'s> {
    store: &'s DocumentStore,
    txn: Option<&'s dyn KvHandle>,
}

impl<'s> Context<'s> {
    /// The owning store handle.
    pub fn store(&self) -> &DocumentStore {
        self.store
    }

    /// Whether this context runs inside a transaction.
    pub fn inside_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// The KV handle in scope: the transaction, or the base store.
    pub(crate) fn kv(&self) -> &dyn KvHandle {
        match self.txn {
            Some(handle) => handle,
            None => self.store.base_handle(),
        }
    }

    /// Run `f` inside one KV transaction.
    ///
    /// Already inside one, `f` runs directly on this context: nesting is
    /// flattened and the outer transaction decides commit or abort.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Context<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        if self.inside_transaction() {
            return f(self);
        }
        self.ensure_initialized()?;
        let txn = self.store.inner.backend.begin()?;
        let result = {
            let handle: &dyn KvHandle = txn.as_ref();
            let child = Context {
                store: self.store,
                txn: Some(handle),
            };
            f(&child)
        };
        match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    tracing::warn!(
                        error = %rollback_err,
                        "rollback failed after transaction error"
                    );
                }
                Err(err)
            }
        }
    }

    /// Run the initialization state machine once per process.
    ///
    /// Re-entry while initialization is in progress is a no-op, so the
    /// schema manager's own scans pass through. Initialization never runs
    /// inside a caller transaction.
    pub(crate) fn ensure_initialized(&self) -> StoreResult<()> {
        {
            let mut state = self.store.inner.init.lock();
            match *state {
                InitState::Initialized | InitState::Initializing => return Ok(()),
                InitState::Uninitialized => {
                    if self.inside_transaction() {
                        return Err(StoreError::transaction_misuse(
                            "cannot initialize the store inside a transaction",
                        ));
                    }
                    *state = InitState::Initializing;
                }
            }
        }

        let result = SchemaManager::new(self.store).initialize();
        let mut state = self.store.inner.init.lock();
        match result {
            Ok(()) => {
                *state = InitState::Initialized;
                drop(state);
                self.store.inner.events.emit(&Event::DidInitialize);
                Ok(())
            }
            Err(err) => {
                *state = InitState::Uninitialized;
                Err(err)
            }
        }
    }

    /// Delete everything under the store prefix and reset initialization.
    pub fn destroy_all(&self) -> StoreResult<()> {
        if self.inside_transaction() {
            return Err(StoreError::transaction_misuse(
                "cannot destroy the store inside a transaction",
            ));
        }
        let prefix = codec::store_key(self.store.name());
        self.store
            .base_handle()
            .find_and_delete(&KvQuery::prefix(prefix))?;
        *self.store.inner.init.lock() = InitState::Uninitialized;
        Ok(())
    }
}
