//! Demo entities shared by every record backend: a user and a bank
//! account that points back at its owner. The bank-to-user reference
//! is only enforced (with cascade) by the relational backend; the
//! document backends treat it as plain data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use polystore_core::{FieldDescriptor, FieldMap, RecordSchema, StoredRecord};

pub const USER_SCHEMA: RecordSchema = RecordSchema {
    collection: "users",
    record_type: "user",
    fields: &[
        FieldDescriptor::required_text("name"),
        FieldDescriptor::integer("age"),
        FieldDescriptor::text("address"),
        FieldDescriptor::boolean("is_married"),
        FieldDescriptor::json("about_him"),
        FieldDescriptor::json("his_family"),
    ],
};

pub const BANK_SCHEMA: RecordSchema = RecordSchema {
    collection: "banks",
    record_type: "bank",
    fields: &[
        FieldDescriptor::required_text("bank_name"),
        FieldDescriptor::required_text("bank_id"),
        FieldDescriptor::reference("user_id", "users", true),
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub age: i64,
    pub address: Option<String>,
    pub is_married: Option<bool>,
    pub about_him: Option<Map<String, Value>>,
    pub his_family: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    pub bank_name: String,
    pub bank_id: String,
    pub user_id: i64,
}

/// Flatten a user into backend-neutral fields. Structured values are
/// stored as JSON text so every backend sees the same shape.
pub fn user_to_fields(user: &User) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("name".to_string(), Value::String(user.name.clone()));
    fields.insert("age".to_string(), Value::from(user.age));
    if let Some(address) = &user.address {
        fields.insert("address".to_string(), Value::String(address.clone()));
    }
    if let Some(is_married) = user.is_married {
        fields.insert("is_married".to_string(), Value::Bool(is_married));
    }
    if let Some(about) = &user.about_him {
        fields.insert(
            "about_him".to_string(),
            Value::String(Value::Object(about.clone()).to_string()),
        );
    }
    if let Some(family) = &user.his_family {
        fields.insert(
            "his_family".to_string(),
            Value::String(Value::Array(family.clone()).to_string()),
        );
    }
    fields
}

/// Rebuild a user from a stored record. Malformed JSON in the
/// structured fields degrades to `None` instead of failing the read.
pub fn user_from_record(record: &StoredRecord) -> User {
    User {
        name: text_field(record, "name").unwrap_or_default(),
        age: record
            .fields
            .get("age")
            .and_then(Value::as_i64)
            .unwrap_or_default(),
        address: text_field(record, "address"),
        is_married: record.fields.get("is_married").and_then(Value::as_bool),
        about_him: json_field(record, "about_him").and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        }),
        his_family: json_field(record, "his_family").and_then(|v| match v {
            Value::Array(items) => Some(items),
            _ => None,
        }),
    }
}

pub fn bank_to_fields(bank: &Bank) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(
        "bank_name".to_string(),
        Value::String(bank.bank_name.clone()),
    );
    fields.insert("bank_id".to_string(), Value::String(bank.bank_id.clone()));
    fields.insert("user_id".to_string(), Value::from(bank.user_id));
    fields
}

pub fn bank_from_record(record: &StoredRecord) -> Bank {
    Bank {
        bank_name: text_field(record, "bank_name").unwrap_or_default(),
        bank_id: text_field(record, "bank_id").unwrap_or_default(),
        user_id: record
            .fields
            .get("user_id")
            .and_then(Value::as_i64)
            .unwrap_or_default(),
    }
}

fn text_field(record: &StoredRecord, name: &str) -> Option<String> {
    record
        .fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn json_field(record: &StoredRecord, name: &str) -> Option<Value> {
    let raw = record.fields.get(name)?;
    match raw {
        Value::String(text) => match serde_json::from_str(text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(id = %record.id, field = name, error = %e, "malformed json field");
                None
            }
        },
        // Backends that keep structure are passed through as-is.
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::RecordId;
    use serde_json::json;

    fn sample_user() -> User {
        User {
            name: "John".to_string(),
            age: 30,
            address: Some("12 Main St".to_string()),
            is_married: Some(true),
            about_him: Some(
                json!({"likes": "chess"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
            his_family: Some(vec![json!("Jane"), json!("Jim")]),
        }
    }

    fn record(fields: FieldMap) -> StoredRecord {
        StoredRecord {
            id: RecordId::Int(1),
            fields,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn user_round_trips_through_fields() {
        let user = sample_user();
        let rebuilt = user_from_record(&record(user_to_fields(&user)));
        assert_eq!(rebuilt, user);
    }

    #[test]
    fn structured_fields_are_stored_as_json_text() {
        let fields = user_to_fields(&sample_user());
        assert_eq!(
            fields.get("about_him"),
            Some(&json!("{\"likes\":\"chess\"}"))
        );
        assert_eq!(fields.get("his_family"), Some(&json!("[\"Jane\",\"Jim\"]")));
    }

    #[test]
    fn malformed_json_degrades_to_none() {
        let mut fields = user_to_fields(&sample_user());
        fields.insert("about_him".to_string(), json!("{not json"));
        let user = user_from_record(&record(fields));
        assert!(user.about_him.is_none());
        assert_eq!(user.his_family, Some(vec![json!("Jane"), json!("Jim")]));
    }

    #[test]
    fn bank_round_trips_through_fields() {
        let bank = Bank {
            bank_name: "First".to_string(),
            bank_id: "F-1".to_string(),
            user_id: 7,
        };
        assert_eq!(bank_from_record(&record(bank_to_fields(&bank))), bank);
    }
}
