//! Differential index maintenance
//!
//! Every item transition (old, new) maps to at most one delete and one
//! write per index:
//! - delete the old entry iff the value tuple changed and the old tuple
//!   was fully present
//! - write the new entry iff the value tuple or the projection changed and
//!   the new tuple is fully present
//!
//! A property whose value is absent (or has no tuple encoding) keeps the
//! item out of that index entirely.

use serde_json::Value;

use crate::collection::{Collection, Index, IndexProperty};
use crate::errors::StoreResult;
use crate::keyspace::{codec, ItemKey, KeyElement};
use crate::kv::{KvHandle, PutFlags};

use super::paths;

/// Evaluate the index value tuple for an item. `None` per slot means the
/// property has no value (absent path or unencodable value).
fn index_values(index: &Index, item: Option<&Value>) -> Vec<Option<KeyElement>> {
    let Some(item) = item else {
        return vec![None; index.keys().len()];
    };
    index
        .keys()
        .iter()
        .zip(index.properties())
        .map(|(path, property)| {
            let raw = match property {
                IndexProperty::Simple => paths::value_at_path(item, path).cloned(),
                IndexProperty::Computed(compute) => compute(item),
            };
            raw.as_ref().and_then(KeyElement::from_json)
        })
        .collect()
}

/// The projection record for an item, when the index declares one.
fn projection_record(index: &Index, item: Option<&Value>) -> Option<Value> {
    let paths = index.projection()?;
    paths::restrict(item?, paths)
}

fn complete(values: &[Option<KeyElement>]) -> Option<Vec<KeyElement>> {
    values.iter().cloned().collect()
}

/// Apply the differential update for one index.
pub(crate) fn update_index(
    handle: &dyn KvHandle,
    store: &str,
    collection: &str,
    key: &ItemKey,
    old_item: Option<&Value>,
    new_item: Option<&Value>,
    index: &Index,
) -> StoreResult<()> {
    let index_name = index.name();

    let old_values = index_values(index, old_item);
    let new_values = index_values(index, new_item);
    let old_projection = projection_record(index, old_item);
    let new_projection = projection_record(index, new_item);

    let values_differ = old_values != new_values;
    let projection_differs = old_projection != new_projection;

    if values_differ {
        if let Some(values) = complete(&old_values) {
            let entry_key = codec::index_entry_key(store, collection, &index_name, &values, key);
            handle.delete(&entry_key, false)?;
        }
    }

    if values_differ || projection_differs {
        if let Some(values) = complete(&new_values) {
            let entry_key = codec::index_entry_key(store, collection, &index_name, &values, key);
            // Absent projection is stored as null and surfaces as "no value".
            let value = new_projection.unwrap_or(Value::Null);
            handle.put(&entry_key, &value, PutFlags::default())?;
        }
    }

    Ok(())
}

/// Apply the differential update for every declared index of a collection,
/// in declaration order.
pub(crate) fn update_indexes(
    handle: &dyn KvHandle,
    store: &str,
    collection: &Collection,
    key: &ItemKey,
    old_item: Option<&Value>,
    new_item: Option<&Value>,
) -> StoreResult<()> {
    for index in collection.indexes() {
        update_index(
            handle,
            store,
            collection.name(),
            key,
            old_item,
            new_item,
            index,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KvQuery, MemoryBackend};
    use serde_json::json;

    fn entries(backend: &MemoryBackend, collection: &str, index: &str) -> Vec<(Vec<KeyElement>, Option<Value>)> {
        let found = backend
            .find(&KvQuery {
                prefix: codec::index_prefix("S", collection, index),
                return_values: true,
                ..KvQuery::default()
            })
            .unwrap();
        found.into_iter().map(|e| (e.key, e.value)).collect()
    }

    #[test]
    fn test_insert_writes_entry() {
        let backend = MemoryBackend::new();
        let index = Index::new(["lastName"]);
        let item = json!({"firstName": "Ada", "lastName": "L"});

        update_index(&backend, "S", "People", &ItemKey::from("u1"), None, Some(&item), &index)
            .unwrap();

        let found = entries(&backend, "People", "lastName");
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].0,
            codec::index_entry_key(
                "S",
                "People",
                "lastName",
                &[KeyElement::from_string("L")],
                &ItemKey::from("u1"),
            )
        );
        assert_eq!(found[0].1, Some(Value::Null));
    }

    #[test]
    fn test_value_change_moves_entry() {
        let backend = MemoryBackend::new();
        let index = Index::new(["lastName"]);
        let old = json!({"lastName": "L"});
        let new = json!({"lastName": "M"});
        let key = ItemKey::from("u1");

        update_index(&backend, "S", "People", &key, None, Some(&old), &index).unwrap();
        update_index(&backend, "S", "People", &key, Some(&old), Some(&new), &index).unwrap();

        let found = entries(&backend, "People", "lastName");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0[2], KeyElement::from_string("M"));
    }

    #[test]
    fn test_unchanged_item_writes_nothing() {
        let backend = MemoryBackend::new();
        let index = Index::new(["lastName"]).with_projection(["firstName"]);
        let item = json!({"firstName": "Ada", "lastName": "L"});
        let key = ItemKey::from("u1");

        update_index(&backend, "S", "People", &key, None, Some(&item), &index).unwrap();
        let before = entries(&backend, "People", "lastName");
        update_index(&backend, "S", "People", &key, Some(&item), Some(&item), &index).unwrap();
        assert_eq!(entries(&backend, "People", "lastName"), before);
    }

    #[test]
    fn test_missing_value_skips_item() {
        let backend = MemoryBackend::new();
        let index = Index::new(["lastName"]);
        let item = json!({"firstName": "Ada"});

        update_index(&backend, "S", "People", &ItemKey::from("u1"), None, Some(&item), &index)
            .unwrap();
        assert!(entries(&backend, "People", "lastName").is_empty());
    }

    #[test]
    fn test_value_becoming_missing_deletes_entry() {
        let backend = MemoryBackend::new();
        let index = Index::new(["lastName"]);
        let old = json!({"lastName": "L"});
        let new = json!({"firstName": "Ada"});
        let key = ItemKey::from("u1");

        update_index(&backend, "S", "People", &key, None, Some(&old), &index).unwrap();
        update_index(&backend, "S", "People", &key, Some(&old), Some(&new), &index).unwrap();
        assert!(entries(&backend, "People", "lastName").is_empty());
    }

    #[test]
    fn test_delete_removes_entry() {
        let backend = MemoryBackend::new();
        let index = Index::new(["lastName"]);
        let item = json!({"lastName": "L"});
        let key = ItemKey::from("u1");

        update_index(&backend, "S", "People", &key, None, Some(&item), &index).unwrap();
        update_index(&backend, "S", "People", &key, Some(&item), None, &index).unwrap();
        assert!(entries(&backend, "People", "lastName").is_empty());
    }

    #[test]
    fn test_projection_only_change_rewrites_in_place() {
        let backend = MemoryBackend::new();
        let index = Index::new(["lastName"]).with_projection(["firstName"]);
        let old = json!({"firstName": "Ada", "lastName": "L"});
        let new = json!({"firstName": "Grace", "lastName": "L"});
        let key = ItemKey::from("u1");

        update_index(&backend, "S", "People", &key, None, Some(&old), &index).unwrap();
        update_index(&backend, "S", "People", &key, Some(&old), Some(&new), &index).unwrap();

        let found = entries(&backend, "People", "lastName");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, Some(json!({"firstName": "Grace"})));
    }

    #[test]
    fn test_projection_with_no_values_is_absent() {
        let backend = MemoryBackend::new();
        let index = Index::new(["lastName"]).with_projection(["nickname"]);
        let item = json!({"lastName": "L", "nickname": null});

        update_index(&backend, "S", "People", &ItemKey::from("u1"), None, Some(&item), &index)
            .unwrap();

        let found = entries(&backend, "People", "lastName");
        assert_eq!(found[0].1, Some(Value::Null));
    }

    #[test]
    fn test_computed_values() {
        let backend = MemoryBackend::new();
        let index = Index::new(Vec::<String>::new()).with_computed("nameLength", |item| {
            item.get("lastName")
                .and_then(Value::as_str)
                .map(|s| json!(s.len()))
        });
        let item = json!({"lastName": "Lovelace"});

        update_index(&backend, "S", "People", &ItemKey::from("u1"), None, Some(&item), &index)
            .unwrap();

        let found = entries(&backend, "People", "nameLength");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0[2], KeyElement::from_int(8));
    }

    #[test]
    fn test_multi_collection_update() {
        let backend = MemoryBackend::new();
        let collection = Collection::new("People")
            .with_index(Index::new(["lastName"]))
            .with_index(Index::new(["firstName"]));
        let item = json!({"firstName": "Ada", "lastName": "L"});

        update_indexes(
            &backend,
            "S",
            &collection,
            &ItemKey::from("u1"),
            None,
            Some(&item),
        )
        .unwrap();

        assert_eq!(entries(&backend, "People", "lastName").len(), 1);
        assert_eq!(entries(&backend, "People", "firstName").len(), 1);
    }
}
