//! coraldb - a document store overlay for ordered key-value engines
//!
//! Collections of JSON items with secondary indexes, projection-aware
//! reads, a persisted schema descriptor with locking and migration, and
//! transactional write-through index maintenance.

pub mod collection;
pub mod config;
pub mod errors;
pub mod events;
pub mod index;
pub mod keyspace;
pub mod kv;
pub mod pacing;
pub mod schema;
pub mod store;

pub use collection::{Collection, Index};
pub use config::StoreOptions;
pub use errors::{StoreError, StoreResult};
pub use events::Event;
pub use keyspace::ItemKey;
pub use store::{
    Context, DeleteOptions, DocumentStore, FindOptions, GetManyOptions, GetOptions, ItemEntry,
    Properties, PutOptions,
};
