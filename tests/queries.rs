//! Query and mutation tests
//!
//! Item round trips, index-backed finds, the projection fast path,
//! batched scans, and transactional write-through index maintenance.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use common::{event_count, record_events, CountingBackend};
use coraldb::keyspace::{codec, KeyElement};
use coraldb::kv::{KvHandle, KvQuery, MemoryBackend};
use coraldb::{
    Collection, DeleteOptions, DocumentStore, FindOptions, GetManyOptions, GetOptions, Index,
    ItemKey, Properties, PutOptions, StoreOptions,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn people_collection() -> Collection {
    Collection::new("People")
        .with_index(Index::new(["lastName"]).with_projection(["firstName"]))
        .with_index(Index::new(["lastName", "firstName"]))
        .with_index(Index::new(["age"]))
}

fn options_for(backend_url: &str) -> StoreOptions {
    StoreOptions::new("S", backend_url).with_collection(people_collection())
}

fn store_on(backend: Arc<MemoryBackend>) -> DocumentStore {
    DocumentStore::with_backend(options_for("memory://"), backend).unwrap()
}

fn ada() -> Value {
    json!({"firstName": "Ada", "lastName": "L", "age": 36})
}

fn seed(store: &DocumentStore) {
    for (key, first, last, age) in [
        ("u1", "Ada", "L", 36),
        ("u2", "Grace", "H", 45),
        ("u3", "Edsger", "D", 72),
        ("u4", "Barbara", "L", 82),
    ] {
        store
            .put(
                "People",
                key,
                &json!({"firstName": first, "lastName": last, "age": age}),
                &PutOptions::default(),
            )
            .unwrap();
    }
}

// =============================================================================
// Item Round Trips
// =============================================================================

#[test]
fn test_put_then_get_round_trip() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    store.put("People", "u1", &ada(), &PutOptions::default()).unwrap();

    assert_eq!(
        store.get("People", "u1", &GetOptions::default()).unwrap(),
        Some(ada())
    );
    assert!(store.exists("People", "u1").unwrap());
}

#[test]
fn test_delete_then_get_is_absent() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    store.put("People", "u1", &ada(), &PutOptions::default()).unwrap();

    assert!(store.delete("People", "u1", &DeleteOptions::default()).unwrap());
    assert!(!store.delete("People", "u1", &DeleteOptions::default()).unwrap());
    assert_eq!(store.get("People", "u1", &GetOptions::default()).unwrap(), None);
    assert!(store
        .get("People", "u1", &GetOptions { error_if_missing: true })
        .is_err());
}

#[test]
fn test_numeric_item_keys() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    store.put("People", 42i64, &ada(), &PutOptions::default()).unwrap();

    assert_eq!(
        store.get("People", 42i64, &GetOptions::default()).unwrap(),
        Some(ada())
    );
    let found = store.find("People", &FindOptions::new()).unwrap();
    assert_eq!(found[0].key, ItemKey::Int(42));
}

#[test]
fn test_put_flags() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    store.put("People", "u1", &ada(), &PutOptions::default()).unwrap();

    let err = store
        .put(
            "People",
            "u1",
            &ada(),
            &PutOptions { create_if_missing: true, error_if_exists: true },
        )
        .unwrap_err();
    assert!(err.is_absence());

    let err = store
        .put(
            "People",
            "u2",
            &ada(),
            &PutOptions { create_if_missing: false, error_if_exists: false },
        )
        .unwrap_err();
    assert!(err.is_absence());
}

#[test]
fn test_invalid_arguments_rejected() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();

    let err = store.put("People", "", &ada(), &PutOptions::default()).unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION");

    let err = store
        .put("People", "u1", &json!([1, 2]), &PutOptions::default())
        .unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION");

    let err = store.get("Pets", "u1", &GetOptions::default()).unwrap_err();
    assert_eq!(err.code(), "INVARIANT_VIOLATION");
    assert!(err.to_string().contains("Pets"));
}

#[test]
fn test_unsupported_backend_url() {
    let err = DocumentStore::open(options_for("postgres://db")).unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION");
}

// =============================================================================
// Index Maintenance
// =============================================================================

/// A put writes the item and one entry per index, at the documented key
/// tuples.
#[test]
fn test_put_writes_index_entries() {
    let backend = MemoryBackend::shared();
    let store = store_on(backend.clone());
    store.put("People", "u1", &ada(), &PutOptions::default()).unwrap();

    assert_eq!(
        backend
            .get(&codec::item_key("S", "People", &ItemKey::from("u1")), true)
            .unwrap(),
        Some(ada())
    );

    let entries = backend
        .find(&KvQuery {
            prefix: codec::index_prefix("S", "People", "lastName"),
            return_values: true,
            ..KvQuery::default()
        })
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].key,
        codec::index_entry_key(
            "S",
            "People",
            "lastName",
            &[KeyElement::from_string("L")],
            &ItemKey::from("u1"),
        )
    );
    // Projection record stored inline.
    assert_eq!(entries[0].value, Some(json!({"firstName": "Ada"})));

    let bare = backend
        .find(&KvQuery {
            prefix: codec::index_prefix("S", "People", "age"),
            return_values: true,
            ..KvQuery::default()
        })
        .unwrap();
    assert_eq!(bare[0].value, Some(Value::Null));
}

/// Updating an indexed property moves the index entry.
#[test]
fn test_update_moves_index_entry() {
    let backend = MemoryBackend::shared();
    let store = store_on(backend.clone());
    store.put("People", "u1", &ada(), &PutOptions::default()).unwrap();

    let mut renamed = ada();
    renamed["lastName"] = json!("M");
    store.put("People", "u1", &renamed, &PutOptions::default()).unwrap();

    let entries = backend
        .find(&KvQuery::prefix(codec::index_prefix("S", "People", "lastName")))
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key[2], KeyElement::from_string("M"));
}

/// Deleting an item removes all its index entries.
#[test]
fn test_delete_removes_index_entries() {
    let backend = MemoryBackend::shared();
    let store = store_on(backend.clone());
    store.put("People", "u1", &ada(), &PutOptions::default()).unwrap();
    store.delete("People", "u1", &DeleteOptions::default()).unwrap();

    for index in ["lastName", "lastName+firstName", "age"] {
        assert!(
            backend
                .find(&KvQuery::prefix(codec::index_prefix("S", "People", index)))
                .unwrap()
                .is_empty(),
            "index {} should be empty",
            index
        );
    }
}

// =============================================================================
// Find
// =============================================================================

#[test]
fn test_find_without_query_scans_collection() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    // Keys only by default, in key order.
    let found = store.find("People", &FindOptions::new()).unwrap();
    let keys: Vec<ItemKey> = found.iter().map(|e| e.key.clone()).collect();
    assert_eq!(
        keys,
        ["u1", "u2", "u3", "u4"].map(ItemKey::from).to_vec()
    );
    assert!(found.iter().all(|e| e.value.is_none()));

    let found = store
        .find("People", &FindOptions::new().with_properties(Properties::All))
        .unwrap();
    assert_eq!(found[0].value, Some(ada()));
}

#[test]
fn test_find_reverse_and_limit() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    let found = store
        .find("People", &FindOptions::new().with_reverse(true).with_limit(2))
        .unwrap();
    let keys: Vec<ItemKey> = found.iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys, ["u4", "u3"].map(ItemKey::from).to_vec());
}

#[test]
fn test_find_with_query_uses_index() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    let found = store
        .find("People", &FindOptions::new().with_query("lastName", json!("L")))
        .unwrap();
    let keys: Vec<ItemKey> = found.iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys, ["u1", "u4"].map(ItemKey::from).to_vec());

    // Properties not in any projection force an item fetch.
    let found = store
        .find(
            "People",
            &FindOptions::new()
                .with_query("lastName", json!("L"))
                .with_properties(Properties::All),
        )
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].value, Some(ada()));
}

#[test]
fn test_find_with_order_sorts_by_index_tuple() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    let found = store
        .find(
            "People",
            &FindOptions::new()
                .with_query("lastName", json!("L"))
                .with_order(["firstName"]),
        )
        .unwrap();
    let keys: Vec<ItemKey> = found.iter().map(|e| e.key.clone()).collect();
    // Ada < Barbara
    assert_eq!(keys, ["u1", "u4"].map(ItemKey::from).to_vec());

    let found = store
        .find(
            "People",
            &FindOptions::new()
                .with_query("lastName", json!("L"))
                .with_order(["firstName"])
                .with_reverse(true),
        )
        .unwrap();
    let keys: Vec<ItemKey> = found.iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys, ["u4", "u1"].map(ItemKey::from).to_vec());
}

#[test]
fn test_find_on_numeric_index() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    let found = store
        .find("People", &FindOptions::new().with_query("age", json!(45)))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, ItemKey::from("u2"));
}

#[test]
fn test_find_without_matching_index_errors() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    let err = store
        .find("People", &FindOptions::new().with_query("email", json!("x")))
        .unwrap_err();
    assert_eq!(err.code(), "INVARIANT_VIOLATION");
}

// =============================================================================
// Projection Fast Path
// =============================================================================

/// Requested properties covered by the index projection are served from
/// the index entries with zero item reads.
#[test]
fn test_projection_fast_path_reads_no_items() {
    let backend = CountingBackend::shared();
    let store =
        DocumentStore::with_backend(options_for("memory://"), backend.clone()).unwrap();
    seed(&store);
    backend.reset();

    let found = store
        .find(
            "People",
            &FindOptions::new()
                .with_query("lastName", json!("L"))
                .with_properties(Properties::paths(["firstName"])),
        )
        .unwrap();

    assert_eq!(backend.item_reads(), 0);
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].key, ItemKey::from("u1"));
    assert_eq!(found[0].value, Some(json!({"firstName": "Ada"})));
    assert_eq!(found[1].value, Some(json!({"firstName": "Barbara"})));
}

/// The fast path returns the same records as a full fetch restricted to
/// the requested paths.
#[test]
fn test_projection_equivalence() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    let query = FindOptions::new().with_query("lastName", json!("L"));
    let fast = store
        .find(
            "People",
            &query.clone().with_properties(Properties::paths(["firstName"])),
        )
        .unwrap();
    let full = store
        .find("People", &query.with_properties(Properties::All))
        .unwrap();

    assert_eq!(fast.len(), full.len());
    for (fast_entry, full_entry) in fast.iter().zip(&full) {
        assert_eq!(fast_entry.key, full_entry.key);
        let item = full_entry.value.as_ref().unwrap();
        assert_eq!(
            fast_entry.value.as_ref().unwrap()["firstName"],
            item["firstName"]
        );
    }
}

// =============================================================================
// Count
// =============================================================================

#[test]
fn test_count() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    assert_eq!(store.count("People", &FindOptions::new()).unwrap(), 4);
    assert_eq!(
        store
            .count("People", &FindOptions::new().with_query("lastName", json!("L")))
            .unwrap(),
        2
    );
    assert_eq!(
        store
            .count("People", &FindOptions::new().with_query("lastName", json!("Z")))
            .unwrap(),
        0
    );
}

// =============================================================================
// get_many
// =============================================================================

#[test]
fn test_get_many() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    assert!(store
        .get_many("People", &[], &GetManyOptions::default())
        .unwrap()
        .is_empty());

    let keys = [
        ItemKey::from("u1"),
        ItemKey::from("missing"),
        ItemKey::from("u3"),
    ];
    let found = store
        .get_many(
            "People",
            &keys,
            &GetManyOptions { error_if_missing: false, properties: Properties::All },
        )
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].key, ItemKey::from("u1"));
    assert_eq!(found[0].value, Some(ada()));

    // Keys only when no properties are requested.
    let found = store
        .get_many("People", &keys, &GetManyOptions::default())
        .unwrap();
    assert!(found.iter().all(|e| e.value.is_none()));

    assert!(store
        .get_many(
            "People",
            &keys,
            &GetManyOptions { error_if_missing: true, properties: Properties::All },
        )
        .is_err());
}

// =============================================================================
// for_each and find_and_delete
// =============================================================================

/// Batched iteration visits every item exactly once, in key order.
#[test]
fn test_for_each_batches_without_revisiting() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    for i in 0..10 {
        store
            .put(
                "People",
                format!("u{}", i),
                &json!({"lastName": "L", "firstName": format!("F{}", i)}),
                &PutOptions::default(),
            )
            .unwrap();
    }

    let mut visited = Vec::new();
    let count = store
        .for_each(
            "People",
            &FindOptions::new().with_batch_size(3),
            |entry| {
                visited.push(entry.key);
                Ok(())
            },
        )
        .unwrap();

    assert_eq!(count, 10);
    let expected: Vec<ItemKey> = (0..10).map(|i| ItemKey::from(format!("u{}", i))).collect();
    assert_eq!(visited, expected);
}

/// Ordered batched iteration resumes after the last order key.
#[test]
fn test_for_each_with_order_resumes() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    for i in 0..7 {
        store
            .put(
                "People",
                format!("u{}", i),
                &json!({"lastName": "L", "firstName": format!("F{}", 9 - i)}),
                &PutOptions::default(),
            )
            .unwrap();
    }

    let mut first_names = Vec::new();
    store
        .for_each(
            "People",
            &FindOptions::new()
                .with_query("lastName", json!("L"))
                .with_order(["firstName"])
                .with_properties(Properties::paths(["firstName"]))
                .with_batch_size(2),
            |entry| {
                first_names.push(entry.value.unwrap()["firstName"].clone());
                Ok(())
            },
        )
        .unwrap();

    let mut sorted = first_names.clone();
    sorted.sort_by_key(|v| v.as_str().unwrap().to_string());
    assert_eq!(first_names.len(), 7);
    assert_eq!(first_names, sorted);
}

/// The order properties need not be part of the requested properties;
/// resumption is driven by the scanned key tuple.
#[test]
fn test_for_each_order_not_in_properties() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    let mut visited = Vec::new();
    store
        .for_each(
            "People",
            &FindOptions::new().with_order(["age"]).with_batch_size(2),
            |entry| {
                assert!(entry.value.is_none());
                visited.push(entry.key);
                Ok(())
            },
        )
        .unwrap();

    // Ascending age: 36, 45, 72, 82.
    assert_eq!(
        visited,
        ["u1", "u2", "u3", "u4"].map(ItemKey::from).to_vec()
    );
}

#[test]
fn test_find_and_delete_with_query() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    let deleted = store
        .find_and_delete(
            "People",
            &FindOptions::new().with_query("lastName", json!("L")).with_batch_size(1),
        )
        .unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(store.count("People", &FindOptions::new()).unwrap(), 2);
    assert!(!store.exists("People", "u1").unwrap());
    assert!(store.exists("People", "u2").unwrap());
}

/// Ordered deletion scans with no materialized values; the cursor comes
/// from the index key tuple.
#[test]
fn test_find_and_delete_with_order() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    seed(&store);

    let deleted = store
        .find_and_delete(
            "People",
            &FindOptions::new().with_order(["age"]).with_batch_size(2),
        )
        .unwrap();

    assert_eq!(deleted, 4);
    assert_eq!(store.count("People", &FindOptions::new()).unwrap(), 0);
    assert_eq!(
        store
            .count("People", &FindOptions::new().with_order(["age"]))
            .unwrap(),
        0
    );
}

// =============================================================================
// Transactions
// =============================================================================

/// A failed transaction leaves neither the item nor its index entries.
#[test]
fn test_transaction_rolls_back_item_and_indexes() {
    let backend = MemoryBackend::shared();
    let store = store_on(backend.clone());
    store.initialize().unwrap();

    let result: Result<(), _> = store.transaction(|tx| {
        tx.put("People", "u1", &ada(), &PutOptions::default())?;
        Err(coraldb::StoreError::configuration("abort"))
    });
    assert!(result.is_err());

    assert!(!store.exists("People", "u1").unwrap());
    assert!(backend
        .find(&KvQuery::prefix(codec::index_prefix("S", "People", "lastName")))
        .unwrap()
        .is_empty());
}

/// Writes inside a transaction observe each other and commit together.
#[test]
fn test_transaction_commits_batch() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();

    store
        .transaction(|tx| {
            tx.put("People", "u1", &ada(), &PutOptions::default())?;
            assert!(tx.exists("People", "u1")?);
            tx.put("People", "u2", &json!({"lastName": "H"}), &PutOptions::default())?;
            assert!(tx.inside_transaction());
            // Nesting is flattened.
            tx.transaction(|nested| nested.delete("People", "u2", &DeleteOptions::default()))
        })
        .unwrap();

    assert!(store.exists("People", "u1").unwrap());
    assert!(!store.exists("People", "u2").unwrap());
}

// =============================================================================
// Events and Computed Indexes
// =============================================================================

#[test]
fn test_put_and_delete_events() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    let seen = record_events(&store);

    store.put("People", "u1", &ada(), &PutOptions::default()).unwrap();
    store.delete("People", "u1", &DeleteOptions::default()).unwrap();

    assert_eq!(event_count(&seen, "didPutItem"), 1);
    assert_eq!(event_count(&seen, "didDeleteItem"), 1);
}

/// Computed properties feed the index key tuple and serve queries.
#[test]
fn test_computed_index_serves_queries() {
    let collection = Collection::new("People").with_index(
        Index::new(Vec::<String>::new()).with_computed("nameLength", |item| {
            item.get("lastName")
                .and_then(Value::as_str)
                .map(|s| json!(s.len()))
        }),
    );
    let store = DocumentStore::open(
        StoreOptions::new("S", "memory://").with_collection(collection),
    )
    .unwrap();

    store
        .put("People", "u1", &json!({"lastName": "Lovelace"}), &PutOptions::default())
        .unwrap();
    store
        .put("People", "u2", &json!({"lastName": "Hopper"}), &PutOptions::default())
        .unwrap();

    let found = store
        .find("People", &FindOptions::new().with_query("nameLength", json!(6)))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, ItemKey::from("u2"));
}

#[test]
fn test_close_rejects_further_operations() {
    let store = DocumentStore::open(options_for("memory://")).unwrap();
    store.initialize().unwrap();
    store.close().unwrap();

    let err = store.get("People", "u1", &GetOptions::default()).unwrap_err();
    assert_eq!(err.code(), "BACKEND");
}
