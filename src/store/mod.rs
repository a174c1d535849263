//! Store handle, ambient context, and operations

pub(crate) mod context;
mod engine;
pub mod options;

pub use context::{Context, DocumentStore};
pub use options::{
    DeleteOptions, FindOptions, GetManyOptions, GetOptions, ItemEntry, Properties, PutOptions,
};
