use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use polystore_core::{
    matches_criteria, FieldMap, RecordBackend, RecordId, RecordSchema, StorageError, StoredRecord,
};

#[derive(Clone)]
struct Row {
    id: RecordId,
    record_type: String,
    fields: FieldMap,
    created_at: i64,
    updated_at: i64,
}

/// Non-persistent record store. One physical store holds every logical
/// entity kind, discriminated by the schema's `record_type` — the same
/// shape the document backends use, which is what makes this a faithful
/// degraded stand-in for them.
#[derive(Default)]
pub struct MemoryRecordStore {
    rows: RwLock<Vec<Row>>,
    id_counter: AtomicI64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> RecordId {
        RecordId::Int(self.id_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl RecordBackend for MemoryRecordStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_collection(&self, _schema: &RecordSchema) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert(
        &self,
        schema: &RecordSchema,
        fields: &FieldMap,
        created_at: i64,
        updated_at: i64,
    ) -> Result<RecordId, StorageError> {
        let id = self.next_id();
        self.rows.write().unwrap().push(Row {
            id: id.clone(),
            record_type: schema.record_type.to_string(),
            fields: fields.clone(),
            created_at,
            updated_at,
        });
        Ok(id)
    }

    async fn fetch_all(&self, schema: &RecordSchema) -> Result<Vec<StoredRecord>, StorageError> {
        let rows = self.rows.read().unwrap();
        let mut records: Vec<StoredRecord> = rows
            .iter()
            .filter(|r| r.record_type == schema.record_type)
            .map(|r| StoredRecord {
                id: r.id.clone(),
                fields: r.fields.clone(),
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_int().cmp(&a.id.as_int()))
        });
        Ok(records)
    }

    async fn fetch_by_id(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .find(|r| &r.id == id && r.record_type == schema.record_type)
            .map(|r| StoredRecord {
                id: r.id.clone(),
                fields: r.fields.clone(),
                created_at: r.created_at,
                updated_at: r.updated_at,
            }))
    }

    async fn fetch_by_filter(
        &self,
        schema: &RecordSchema,
        criteria: &FieldMap,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let all = self.fetch_all(schema).await?;
        Ok(all
            .into_iter()
            .filter(|r| matches_criteria(&r.fields, criteria))
            .collect())
    }

    async fn update_fields(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
        fields: &FieldMap,
        updated_at: i64,
    ) -> Result<bool, StorageError> {
        let mut rows = self.rows.write().unwrap();
        match rows
            .iter_mut()
            .find(|r| &r.id == id && r.record_type == schema.record_type)
        {
            Some(row) => {
                for (k, v) in fields {
                    row.fields.insert(k.clone(), v.clone());
                }
                row.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, schema: &RecordSchema, id: &RecordId) -> Result<bool, StorageError> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| !(&r.id == id && r.record_type == schema.record_type));
        Ok(rows.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::{CrudEngine, FieldDescriptor};
    use serde_json::json;
    use std::sync::Arc;

    const USERS: RecordSchema = RecordSchema {
        collection: "users",
        record_type: "user",
        fields: &[
            FieldDescriptor::required_text("name"),
            FieldDescriptor::integer("age"),
        ],
    };

    const BANKS: RecordSchema = RecordSchema {
        collection: "banks",
        record_type: "bank",
        fields: &[FieldDescriptor::required_text("bank_name")],
    };

    fn fields(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn cross_type_isolation_in_shared_store() {
        let store = Arc::new(MemoryRecordStore::new());
        let users = CrudEngine::new(store.clone(), &USERS).await.unwrap();
        let banks = CrudEngine::new(store.clone(), &BANKS).await.unwrap();

        let bank_id = banks
            .create(&fields(&[("bank_name", json!("First"))]))
            .await
            .unwrap();

        // The raw id exists, but the discriminator does not match.
        assert!(users.read_by_id(&bank_id).await.unwrap().is_none());
        assert!(!users.update(&bank_id, &FieldMap::new()).await.unwrap());
        assert!(!users.delete(&bank_id).await.unwrap());
        assert!(banks.read_by_id(&bank_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn filter_and_ordering() {
        let store = Arc::new(MemoryRecordStore::new());
        let users = CrudEngine::new(store, &USERS).await.unwrap();

        users
            .create(&fields(&[("name", json!("a")), ("age", json!(30))]))
            .await
            .unwrap();
        users
            .create(&fields(&[("name", json!("b")), ("age", json!(30))]))
            .await
            .unwrap();
        users
            .create(&fields(&[("name", json!("b")), ("age", json!(31))]))
            .await
            .unwrap();

        let found = users
            .read_by_filter(&fields(&[("name", json!("b")), ("age", json!(30))]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        // Newest first: id tiebreak within the same millisecond.
        let all = users.read_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].id.as_int() > all[2].id.as_int());
    }
}
