//! In-process ordered KV backend
//!
//! `BTreeMap` keyed by typed tuples, guarded by a mutex. Transactions stage
//! a write-set (values and delete markers) and apply it atomically at
//! commit; a transaction lock is held for the transaction's lifetime, so
//! transactions are serialized and never observe each other's partial
//! state. Reads inside a transaction observe its own staged writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;

use crate::keyspace::element::render_key;
use crate::keyspace::KvKey;

use super::backend::{
    starts_with, within_bounds, KvBackend, KvEntry, KvHandle, KvQuery, KvTransaction, PutFlags,
};
use super::errors::{KvError, KvResult};

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<KvKey, Value>,
    closed: bool,
}

impl MemoryState {
    fn ensure_open(&self) -> KvResult<()> {
        if self.closed {
            return Err(KvError::Closed);
        }
        Ok(())
    }

    /// Collect every entry matching the query, in ascending key order,
    /// ignoring `reverse` and `limit`.
    fn scan_all(&self, query: &KvQuery) -> Vec<(KvKey, Value)> {
        let mut out = Vec::new();
        for (key, value) in self.entries.range(query.prefix.clone()..) {
            if !starts_with(key, &query.prefix) {
                break;
            }
            if !within_bounds(key, query) {
                continue;
            }
            out.push((key.clone(), value.clone()));
        }
        out
    }
}

/// In-memory [`KvBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    txn_lock: Mutex<()>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty backend behind an `Arc`, ready to share between
    /// several store handles.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn apply_order(mut entries: Vec<(KvKey, Value)>, query: &KvQuery) -> Vec<KvEntry> {
        if query.reverse {
            entries.reverse();
        }
        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }
        entries
            .into_iter()
            .map(|(key, value)| KvEntry {
                key,
                value: query.return_values.then_some(value),
            })
            .collect()
    }
}

impl KvHandle for MemoryBackend {
    fn get(&self, key: &KvKey, error_if_missing: bool) -> KvResult<Option<Value>> {
        let state = self.state.lock();
        state.ensure_open()?;
        match state.entries.get(key) {
            Some(value) => Ok(Some(value.clone())),
            None if error_if_missing => Err(KvError::NotFound(render_key(key))),
            None => Ok(None),
        }
    }

    fn put(&self, key: &KvKey, value: &Value, flags: PutFlags) -> KvResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let exists = state.entries.contains_key(key);
        if exists && flags.error_if_exists {
            return Err(KvError::AlreadyExists(render_key(key)));
        }
        if !exists && !flags.create_if_missing {
            return Err(KvError::NotFound(render_key(key)));
        }
        state.entries.insert(key.clone(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &KvKey, error_if_missing: bool) -> KvResult<bool> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        match state.entries.remove(key) {
            Some(_) => Ok(true),
            None if error_if_missing => Err(KvError::NotFound(render_key(key))),
            None => Ok(false),
        }
    }

    fn get_many(
        &self,
        keys: &[KvKey],
        error_if_missing: bool,
        return_values: bool,
    ) -> KvResult<Vec<KvEntry>> {
        let state = self.state.lock();
        state.ensure_open()?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            match state.entries.get(key) {
                Some(value) => out.push(KvEntry {
                    key: key.clone(),
                    value: return_values.then(|| value.clone()),
                }),
                None if error_if_missing => return Err(KvError::NotFound(render_key(key))),
                None => {}
            }
        }
        Ok(out)
    }

    fn find(&self, query: &KvQuery) -> KvResult<Vec<KvEntry>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(Self::apply_order(state.scan_all(query), query))
    }

    fn count(&self, query: &KvQuery) -> KvResult<u64> {
        let state = self.state.lock();
        state.ensure_open()?;
        let mut count = state.scan_all(query).len();
        if let Some(limit) = query.limit {
            count = count.min(limit);
        }
        Ok(count as u64)
    }

    fn find_and_delete(&self, query: &KvQuery) -> KvResult<u64> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let keys: Vec<KvKey> = state.scan_all(query).into_iter().map(|(k, _)| k).collect();
        for key in &keys {
            state.entries.remove(key);
        }
        Ok(keys.len() as u64)
    }
}

impl KvBackend for MemoryBackend {
    fn begin<'a>(&'a self) -> KvResult<Box<dyn KvTransaction + 'a>> {
        // Serializes transactions. The store flattens nested transactions,
        // so one thread never begins twice.
        let guard = self.txn_lock.lock();
        self.state.lock().ensure_open()?;
        Ok(Box::new(MemoryTransaction {
            backend: self,
            staged: Mutex::new(BTreeMap::new()),
            _guard: guard,
        }))
    }

    fn close(&self) -> KvResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// A staged write-set over a [`MemoryBackend`]. `None` marks a delete.
pub struct MemoryTransaction<'a> {
    backend: &'a MemoryBackend,
    staged: Mutex<BTreeMap<KvKey, Option<Value>>>,
    _guard: MutexGuard<'a, ()>,
}

impl MemoryTransaction<'_> {
    fn read(&self, key: &KvKey) -> KvResult<Option<Value>> {
        if let Some(staged) = self.staged.lock().get(key) {
            return Ok(staged.clone());
        }
        let state = self.backend.state.lock();
        state.ensure_open()?;
        Ok(state.entries.get(key).cloned())
    }

    /// Committed entries merged with the staged write-set, in key order.
    fn effective_scan(&self, query: &KvQuery) -> KvResult<Vec<(KvKey, Value)>> {
        let mut merged: BTreeMap<KvKey, Value> = {
            let state = self.backend.state.lock();
            state.ensure_open()?;
            state.scan_all(query).into_iter().collect()
        };
        for (key, staged) in self.staged.lock().iter() {
            if !starts_with(key, &query.prefix) || !within_bounds(key, query) {
                continue;
            }
            match staged {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

impl KvHandle for MemoryTransaction<'_> {
    fn get(&self, key: &KvKey, error_if_missing: bool) -> KvResult<Option<Value>> {
        match self.read(key)? {
            Some(value) => Ok(Some(value)),
            None if error_if_missing => Err(KvError::NotFound(render_key(key))),
            None => Ok(None),
        }
    }

    fn put(&self, key: &KvKey, value: &Value, flags: PutFlags) -> KvResult<()> {
        let exists = self.read(key)?.is_some();
        if exists && flags.error_if_exists {
            return Err(KvError::AlreadyExists(render_key(key)));
        }
        if !exists && !flags.create_if_missing {
            return Err(KvError::NotFound(render_key(key)));
        }
        self.staged.lock().insert(key.clone(), Some(value.clone()));
        Ok(())
    }

    fn delete(&self, key: &KvKey, error_if_missing: bool) -> KvResult<bool> {
        let exists = self.read(key)?.is_some();
        if !exists {
            if error_if_missing {
                return Err(KvError::NotFound(render_key(key)));
            }
            return Ok(false);
        }
        self.staged.lock().insert(key.clone(), None);
        Ok(true)
    }

    fn get_many(
        &self,
        keys: &[KvKey],
        error_if_missing: bool,
        return_values: bool,
    ) -> KvResult<Vec<KvEntry>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            match self.read(key)? {
                Some(value) => out.push(KvEntry {
                    key: key.clone(),
                    value: return_values.then_some(value),
                }),
                None if error_if_missing => return Err(KvError::NotFound(render_key(key))),
                None => {}
            }
        }
        Ok(out)
    }

    fn find(&self, query: &KvQuery) -> KvResult<Vec<KvEntry>> {
        Ok(MemoryBackend::apply_order(
            self.effective_scan(query)?,
            query,
        ))
    }

    fn count(&self, query: &KvQuery) -> KvResult<u64> {
        let mut count = self.effective_scan(query)?.len();
        if let Some(limit) = query.limit {
            count = count.min(limit);
        }
        Ok(count as u64)
    }

    fn find_and_delete(&self, query: &KvQuery) -> KvResult<u64> {
        let keys: Vec<KvKey> = self
            .effective_scan(query)?
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        let mut staged = self.staged.lock();
        for key in &keys {
            staged.insert(key.clone(), None);
        }
        Ok(keys.len() as u64)
    }
}

impl KvTransaction for MemoryTransaction<'_> {
    fn commit(self: Box<Self>) -> KvResult<()> {
        let mut state = self.backend.state.lock();
        state.ensure_open()?;
        for (key, staged) in self.staged.lock().iter() {
            match staged {
                Some(value) => {
                    state.entries.insert(key.clone(), value.clone());
                }
                None => {
                    state.entries.remove(key);
                }
            }
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> KvResult<()> {
        Ok(())
    }
}
