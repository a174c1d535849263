//! Property path access
//!
//! Items are JSON objects; property paths are dot-joined. Paths are only
//! flattened for index and projection value extraction, never for storage.

use serde_json::{Map, Value};

/// Value at a dot-joined path inside an item.
///
/// Absence (`None`) is distinct from an explicit JSON null at the path.
pub(crate) fn value_at_path<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Build a flat record of the non-null values at the given paths.
///
/// Keys of the record are the paths themselves. Returns `None` when no
/// path produced a value — an empty record is never materialized.
pub(crate) fn restrict(item: &Value, paths: &[String]) -> Option<Value> {
    let mut record = Map::new();
    for path in paths {
        if let Some(value) = value_at_path(item, path) {
            if !value.is_null() {
                record.insert(path.clone(), value.clone());
            }
        }
    }
    if record.is_empty() {
        None
    } else {
        Some(Value::Object(record))
    }
}

/// Pick the given keys out of a flat record (e.g. a stored projection).
///
/// Returns `None` when nothing remains.
pub(crate) fn filter_record(record: &Value, paths: &[String]) -> Option<Value> {
    let source = record.as_object()?;
    let mut out = Map::new();
    for path in paths {
        if let Some(value) = source.get(path) {
            out.insert(path.clone(), value.clone());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(Value::Object(out))
    }
}
