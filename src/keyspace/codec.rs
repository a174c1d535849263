//! Key layout for the shared KV namespace
//!
//! All persisted state of one store lives under the tuple prefix
//! `[store_name]`:
//!
//! - store descriptor: `[store]`
//! - item: `[store, collection, item_key]`
//! - index entry: `[store, collection ":" index_name, v1..vN, item_key]`
//!
//! `index_name` joins the index's property paths with `+`. Both separators
//! are part of the persisted key space and must not change without a
//! migration.

use super::element::{KeyElement, KvKey};
use super::item_key::ItemKey;

/// Joiner between the property paths of one index.
pub const INDEX_NAME_JOINER: &str = "+";

/// Separator between collection name and index name.
pub const INDEX_NAMESPACE_SEPARATOR: &str = ":";

/// Key of the store descriptor: `[store]`.
pub fn store_key(store: &str) -> KvKey {
    vec![KeyElement::from_string(store)]
}

/// Prefix of all items in a collection: `[store, collection]`.
pub fn collection_prefix(store: &str, collection: &str) -> KvKey {
    vec![
        KeyElement::from_string(store),
        KeyElement::from_string(collection),
    ]
}

/// Key of one item: `[store, collection, item_key]`.
pub fn item_key(store: &str, collection: &str, key: &ItemKey) -> KvKey {
    vec![
        KeyElement::from_string(store),
        KeyElement::from_string(collection),
        key.to_element(),
    ]
}

/// Name of an index: its property paths joined with `+`.
pub fn index_name(keys: &[String]) -> String {
    keys.join(INDEX_NAME_JOINER)
}

/// Namespace holding one index's entries: `collection ":" index_name`.
pub fn index_namespace(collection: &str, index_name: &str) -> String {
    format!("{}{}{}", collection, INDEX_NAMESPACE_SEPARATOR, index_name)
}

/// Prefix of all entries of one index: `[store, collection:index]`.
pub fn index_prefix(store: &str, collection: &str, index_name: &str) -> KvKey {
    vec![
        KeyElement::from_string(store),
        KeyElement::from_string(index_namespace(collection, index_name)),
    ]
}

/// Key of one index entry: `[store, collection:index, v1..vN, item_key]`.
pub fn index_entry_key(
    store: &str,
    collection: &str,
    index_name: &str,
    values: &[KeyElement],
    key: &ItemKey,
) -> KvKey {
    let mut out = index_prefix(store, collection, index_name);
    out.extend(values.iter().cloned());
    out.push(key.to_element());
    out
}

/// Scan prefix for a query: the entry key truncated to the provided
/// query values (in index declaration order).
pub fn index_query_prefix(
    store: &str,
    collection: &str,
    index_name: &str,
    values: &[KeyElement],
) -> KvKey {
    let mut out = index_prefix(store, collection, index_name);
    out.extend(values.iter().cloned());
    out
}
