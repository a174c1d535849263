//! Shared test helpers
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use coraldb::keyspace::KvKey;
use coraldb::kv::{
    KvBackend, KvEntry, KvHandle, KvQuery, KvResult, KvTransaction, MemoryBackend, PutFlags,
};
use coraldb::DocumentStore;

/// Every KV pair in the backend, in key order.
pub fn dump(backend: &dyn KvHandle) -> Vec<(KvKey, Value)> {
    backend
        .find(&KvQuery {
            prefix: Vec::new(),
            return_values: true,
            ..KvQuery::default()
        })
        .unwrap()
        .into_iter()
        .map(|e| (e.key, e.value.unwrap()))
        .collect()
}

/// Subscribe a recorder that collects event names in order.
pub fn record_events(store: &DocumentStore) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe(move |event| sink.lock().unwrap().push(event.name().to_string()));
    seen
}

pub fn event_count(seen: &Mutex<Vec<String>>, name: &str) -> usize {
    seen.lock().unwrap().iter().filter(|e| *e == name).count()
}

/// A backend wrapper counting base-handle reads, for asserting that
/// projection-covered queries never touch items.
pub struct CountingBackend {
    inner: MemoryBackend,
    pub gets: AtomicUsize,
    pub get_manys: AtomicUsize,
}

impl CountingBackend {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(),
            gets: AtomicUsize::new(0),
            get_manys: AtomicUsize::new(0),
        })
    }

    pub fn reset(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.get_manys.store(0, Ordering::SeqCst);
    }

    pub fn item_reads(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.get_manys.load(Ordering::SeqCst)
    }
}

impl KvHandle for CountingBackend {
    fn get(&self, key: &KvKey, error_if_missing: bool) -> KvResult<Option<Value>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key, error_if_missing)
    }

    fn put(&self, key: &KvKey, value: &Value, flags: PutFlags) -> KvResult<()> {
        self.inner.put(key, value, flags)
    }

    fn delete(&self, key: &KvKey, error_if_missing: bool) -> KvResult<bool> {
        self.inner.delete(key, error_if_missing)
    }

    fn get_many(
        &self,
        keys: &[KvKey],
        error_if_missing: bool,
        return_values: bool,
    ) -> KvResult<Vec<KvEntry>> {
        self.get_manys.fetch_add(1, Ordering::SeqCst);
        self.inner.get_many(keys, error_if_missing, return_values)
    }

    fn find(&self, query: &KvQuery) -> KvResult<Vec<KvEntry>> {
        self.inner.find(query)
    }

    fn count(&self, query: &KvQuery) -> KvResult<u64> {
        self.inner.count(query)
    }

    fn find_and_delete(&self, query: &KvQuery) -> KvResult<u64> {
        self.inner.find_and_delete(query)
    }
}

impl KvBackend for CountingBackend {
    fn begin<'a>(&'a self) -> KvResult<Box<dyn KvTransaction + 'a>> {
        self.inner.begin()
    }

    fn close(&self) -> KvResult<()> {
        self.inner.close()
    }
}
