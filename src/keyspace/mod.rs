//! Key space layout and encoding
//!
//! Collections, items, indexes, and the store descriptor share one ordered
//! KV namespace of typed key tuples.

pub mod codec;
pub mod element;
pub mod item_key;

pub use codec::{INDEX_NAMESPACE_SEPARATOR, INDEX_NAME_JOINER};
pub use element::{KeyElement, KvKey};
pub use item_key::ItemKey;
