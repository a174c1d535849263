//! Lifecycle events
//!
//! Typed notifications emitted by the store. Fan-out is synchronous and
//! in subscription order; listeners run before the emitting operation
//! returns.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::keyspace::ItemKey;

/// Observable store events.
#[derive(Debug, Clone)]
pub enum Event {
    /// The store descriptor was created (first use)
    DidCreate,
    /// Initialization finished for this handle
    DidInitialize,
    /// Descriptor version upgrade is about to mutate the descriptor
    UpgradeDidStart {
        /// Persisted version before the upgrade
        from_version: u64,
    },
    /// Descriptor version upgrade finished
    UpgradeDidStop,
    /// Migration performed its first actual change
    MigrationDidStart,
    /// Migration finished (emitted whenever it started)
    MigrationDidStop,
    /// An item was written
    DidPutItem {
        /// Owning collection
        collection: String,
        /// Item key
        key: ItemKey,
        /// The written item
        item: Value,
    },
    /// An item was deleted
    DidDeleteItem {
        /// Owning collection
        collection: String,
        /// Item key
        key: ItemKey,
        /// The item as it was before the delete
        old_item: Value,
    },
}

impl Event {
    /// Stable event name for logs and tests.
    pub fn name(&self) -> &'static str {
        match self {
            Event::DidCreate => "didCreate",
            Event::DidInitialize => "didInitialize",
            Event::UpgradeDidStart { .. } => "upgradeDidStart",
            Event::UpgradeDidStop => "upgradeDidStop",
            Event::MigrationDidStart => "migrationDidStart",
            Event::MigrationDidStop => "migrationDidStop",
            Event::DidPutItem { .. } => "didPutItem",
            Event::DidDeleteItem { .. } => "didDeleteItem",
        }
    }
}

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Synchronous in-order event fan-out.
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners are invoked in registration order.
    pub fn subscribe(&self, listener: impl Fn(&Event) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Dispatch an event to every listener.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe
    /// without deadlocking dispatch.
    pub fn emit(&self, event: &Event) {
        let snapshot: Vec<Listener> = self.listeners.read().clone();
        for listener in snapshot {
            listener(event);
        }
    }
}
