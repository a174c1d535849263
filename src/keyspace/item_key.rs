//! Item key type
//!
//! Items are addressed by a non-empty string or a number.

use std::fmt;

use serde_json::Value;

use super::element::KeyElement;

/// Key of a single item within a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKey {
    /// String key (must be non-empty)
    String(String),
    /// Integer key
    Int(i64),
    /// Float key
    Float(f64),
}

impl ItemKey {
    /// Convert to a key tuple element.
    pub(crate) fn to_element(&self) -> KeyElement {
        match self {
            ItemKey::String(s) => KeyElement::from_string(s.clone()),
            ItemKey::Int(i) => KeyElement::from_int(*i),
            ItemKey::Float(f) => KeyElement::from_float(*f),
        }
    }

    /// Recover an item key from the last element of a KV key.
    ///
    /// Null and Bool elements never encode item keys.
    pub(crate) fn from_element(element: &KeyElement) -> Option<Self> {
        match element.to_json() {
            Value::String(s) => Some(ItemKey::String(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ItemKey::Int(i))
                } else {
                    n.as_f64().map(ItemKey::Float)
                }
            }
            _ => None,
        }
    }

    /// The key as a JSON value.
    pub fn as_json(&self) -> Value {
        match self {
            ItemKey::String(s) => Value::String(s.clone()),
            ItemKey::Int(i) => Value::from(*i),
            ItemKey::Float(f) => Value::from(*f),
        }
    }

    /// Empty string keys are rejected.
    pub(crate) fn is_valid(&self) -> bool {
        match self {
            ItemKey::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::String(s) => write!(f, "{}", s),
            ItemKey::Int(i) => write!(f, "{}", i),
            ItemKey::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for ItemKey {
    fn from(s: &str) -> Self {
        ItemKey::String(s.to_string())
    }
}

impl From<String> for ItemKey {
    fn from(s: String) -> Self {
        ItemKey::String(s)
    }
}

impl From<i64> for ItemKey {
    fn from(i: i64) -> Self {
        ItemKey::Int(i)
    }
}

impl From<f64> for ItemKey {
    fn from(f: f64) -> Self {
        ItemKey::Float(f)
    }
}
