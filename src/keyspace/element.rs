//! Typed key elements
//!
//! Every KV key is an ordered tuple of typed elements. Element ordering is
//! deterministic: Null < Bool < Int < Float < String. Floats are stored as
//! total-ordering bits so the derived `Ord` matches numeric order.

use serde_json::Value;

/// One element of a key tuple.
///
/// Ordering is deterministic: Null < Bool < Int < Float < String.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyElement {
    /// JSON null (sorts lowest)
    Null,
    /// Boolean value (false < true)
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value (stored as bits for total ordering)
    Float(u64),
    /// String value
    String(String),
}

impl KeyElement {
    /// Create an element from a boolean
    pub fn from_bool(v: bool) -> Self {
        KeyElement::Bool(v)
    }

    /// Create an element from an integer
    pub fn from_int(v: i64) -> Self {
        KeyElement::Int(v)
    }

    /// Create an element from a float
    ///
    /// Uses bit representation for total ordering.
    pub fn from_float(v: f64) -> Self {
        let bits = v.to_bits();
        // Negative floats flip all bits, positive flip the sign bit, so the
        // unsigned bit pattern orders the same way as the float.
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        KeyElement::Float(ordered)
    }

    /// Create an element from a string
    pub fn from_string(v: impl Into<String>) -> Self {
        KeyElement::String(v.into())
    }

    /// Create an element from a JSON value.
    ///
    /// Arrays and objects have no tuple encoding and return None.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(KeyElement::Null),
            Value::Bool(b) => Some(KeyElement::from_bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(KeyElement::from_int(i))
                } else {
                    n.as_f64().map(KeyElement::from_float)
                }
            }
            Value::String(s) => Some(KeyElement::from_string(s)),
            _ => None,
        }
    }

    /// Convert the element back to a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            KeyElement::Null => Value::Null,
            KeyElement::Bool(b) => Value::Bool(*b),
            KeyElement::Int(i) => Value::from(*i),
            KeyElement::Float(bits) => {
                let raw = if (bits >> 63) == 1 {
                    bits ^ (1 << 63)
                } else {
                    !bits
                };
                Value::from(f64::from_bits(raw))
            }
            KeyElement::String(s) => Value::String(s.clone()),
        }
    }
}

/// A full KV key: an ordered tuple of typed elements.
pub type KvKey = Vec<KeyElement>;

/// Render a key for error messages, e.g. `["S","People","u1"]`.
pub fn render_key(key: &[KeyElement]) -> String {
    let parts: Vec<String> = key
        .iter()
        .map(|e| match e {
            KeyElement::String(s) => format!("{:?}", s),
            other => other.to_json().to_string(),
        })
        .collect();
    format!("[{}]", parts.join(","))
}
