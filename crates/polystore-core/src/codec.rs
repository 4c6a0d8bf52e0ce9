//! Serializes typed values into the single string representation that
//! untyped backends accept, and recovers the original type on read.
//!
//! Structured values travel inside a tagged envelope:
//! `{"kind":"array"|"object","payload":<json>}`. Scalars are stored bare
//! and coerced back on read in a fixed order: boolean literal, numeric
//! literal, raw string. Callers that need the literal string "true" must
//! store it through an envelope, not as a bare scalar.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;
use crate::value::StorageValue;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    kind: EnvelopeKind,
    payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EnvelopeKind {
    Array,
    Object,
}

/// Encode a typed value into its stored string form.
pub fn encode(value: &StorageValue) -> Result<String, StorageError> {
    match value {
        StorageValue::String(s) => Ok(s.clone()),
        StorageValue::Number(n) => {
            if !n.is_finite() {
                return Err(StorageError::UnsupportedType(
                    "non-finite number".to_string(),
                ));
            }
            Ok(format_number(*n))
        }
        StorageValue::Boolean(b) => Ok(b.to_string()),
        StorageValue::Array(items) => wrap(EnvelopeKind::Array, Value::Array(items.clone())),
        StorageValue::Object(map) => wrap(EnvelopeKind::Object, Value::Object(map.clone())),
    }
}

/// Encode an arbitrary JSON value. Arrays and objects are enveloped,
/// scalars stored bare. JSON null has no stored form.
pub fn encode_json(value: &Value) -> Result<String, StorageError> {
    match value {
        Value::Null => Err(StorageError::UnsupportedType("null".to_string())),
        Value::Bool(b) => encode(&StorageValue::Boolean(*b)),
        Value::Number(n) => {
            let n = n
                .as_f64()
                .ok_or_else(|| StorageError::UnsupportedType("non-finite number".to_string()))?;
            encode(&StorageValue::Number(n))
        }
        Value::String(s) => encode(&StorageValue::String(s.clone())),
        Value::Array(items) => wrap(EnvelopeKind::Array, Value::Array(items.clone())),
        Value::Object(map) => wrap(EnvelopeKind::Object, Value::Object(map.clone())),
    }
}

/// Decode a stored string back into a typed value.
///
/// Envelope recovery runs first and, once a valid tag is present, always
/// wins over primitive coercion. A tagged envelope whose payload does not
/// match its tag decodes to the empty collection of the tagged kind.
pub fn decode(raw: &str) -> StorageValue {
    if let Ok(envelope) = serde_json::from_str::<Envelope>(raw) {
        return match (envelope.kind, envelope.payload) {
            (EnvelopeKind::Array, Value::Array(items)) => StorageValue::Array(items),
            (EnvelopeKind::Array, _) => StorageValue::Array(Vec::new()),
            (EnvelopeKind::Object, Value::Object(map)) => StorageValue::Object(map),
            (EnvelopeKind::Object, _) => StorageValue::Object(serde_json::Map::new()),
        };
    }
    match raw {
        "true" => StorageValue::Boolean(true),
        "false" => StorageValue::Boolean(false),
        _ => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => StorageValue::Number(n),
            _ => StorageValue::String(raw.to_string()),
        },
    }
}

fn wrap(kind: EnvelopeKind, payload: Value) -> Result<String, StorageError> {
    serde_json::to_string(&Envelope { kind, payload })
        .map_err(|e| StorageError::UnsupportedType(e.to_string()))
}

fn format_number(n: f64) -> String {
    // Integral values print without a fractional part so that "30" stays
    // "30" across a round trip.
    if n.fract() == 0.0 && n.abs() < 9e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_round_trip() {
        for value in [
            StorageValue::String("hello".to_string()),
            StorageValue::Number(30.0),
            StorageValue::Number(1.5),
            StorageValue::Number(-42.0),
            StorageValue::Boolean(true),
            StorageValue::Boolean(false),
        ] {
            let raw = encode(&value).unwrap();
            assert_eq!(decode(&raw), value, "round trip failed for {raw}");
        }
    }

    #[test]
    fn structured_round_trip() {
        let arr = StorageValue::Array(vec![json!("a"), json!(2), json!({"k": true})]);
        assert_eq!(decode(&encode(&arr).unwrap()), arr);

        let mut map = serde_json::Map::new();
        map.insert("name".to_string(), json!("John"));
        map.insert("tags".to_string(), json!(["x", "y"]));
        let obj = StorageValue::Object(map);
        assert_eq!(decode(&encode(&obj).unwrap()), obj);
    }

    #[test]
    fn envelope_wire_format() {
        let raw = encode(&StorageValue::Array(vec![json!(1), json!(2)])).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["kind"], json!("array"));
        assert_eq!(parsed["payload"], json!([1, 2]));
    }

    #[test]
    fn coercion_order_boolean_then_number_then_string() {
        assert_eq!(decode("true"), StorageValue::Boolean(true));
        assert_eq!(decode("false"), StorageValue::Boolean(false));
        assert_eq!(decode("12.5"), StorageValue::Number(12.5));
        assert_eq!(decode("1e3"), StorageValue::Number(1000.0));
        assert_eq!(decode("not a number"), StorageValue::String("not a number".to_string()));
        assert_eq!(decode("NaN"), StorageValue::String("NaN".to_string()));
    }

    #[test]
    fn bare_json_object_is_not_an_envelope() {
        // A raw JSON object without the tag falls through to string.
        assert_eq!(
            decode(r#"{"a":1}"#),
            StorageValue::String(r#"{"a":1}"#.to_string())
        );
    }

    #[test]
    fn envelope_tag_wins_over_coercion() {
        // Even a payload that looks like a scalar stays structured.
        let raw = r#"{"kind":"array","payload":["true"]}"#;
        assert_eq!(decode(raw), StorageValue::Array(vec![json!("true")]));
        // A mismatched payload degrades to the empty tagged kind.
        let raw = r#"{"kind":"array","payload":"true"}"#;
        assert_eq!(decode(raw), StorageValue::Array(Vec::new()));
    }

    #[test]
    fn encode_rejects_unsupported() {
        assert!(matches!(
            encode(&StorageValue::Number(f64::NAN)),
            Err(StorageError::UnsupportedType(_))
        ));
        assert!(matches!(
            encode_json(&Value::Null),
            Err(StorageError::UnsupportedType(_))
        ));
    }

    #[test]
    fn stored_boolean_string_reads_back_as_boolean() {
        // Policy: a bare "true" cannot be distinguished from a boolean.
        let raw = encode(&StorageValue::String("true".to_string())).unwrap();
        assert_eq!(decode(&raw), StorageValue::Boolean(true));
    }
}
