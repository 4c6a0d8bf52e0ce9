use serde_json::{Map, Value};

/// A typed value as seen by the scalar key-value contract.
///
/// Structural equality holds for arrays and objects; object key order is
/// irrelevant (`serde_json::Map` compares by content).
#[derive(Debug, Clone, PartialEq)]
pub enum StorageValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl StorageValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StorageValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            StorageValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            StorageValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            StorageValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            StorageValue::Object(map) => Some(map),
            _ => None,
        }
    }
}
