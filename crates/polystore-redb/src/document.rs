use std::cmp::Reverse;
use std::path::Path;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use polystore_core::{
    matches_criteria, DeleteOutcome, FieldMap, RecordBackend, RecordId, RecordSchema, StorageError,
    StoredRecord,
};

// One physical table for every collection; the record type inside the
// body discriminates. Each write runs in its own redb transaction.
const DOCUMENTS: TableDefinition<&str, &str> = TableDefinition::new("documents");

#[derive(Serialize, Deserialize)]
struct DocBody {
    #[serde(rename = "type")]
    record_type: String,
    fields: Value,
    created_at: i64,
    updated_at: i64,
}

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(e.to_string())
}

/// Schemaless document store keyed by generated UUIDs.
pub struct DocumentStore {
    db: Database,
}

impl DocumentStore {
    /// Open or create a database file at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(&path).map_err(|e| StorageError::BackendUnavailable {
            backend: "document",
            hint: format!("cannot open '{}': {e}", path.as_ref().display()),
        })?;
        tracing::debug!(path = %path.as_ref().display(), "document store opened");
        Self::prime(db)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(db_err)?;
        Self::prime(db)
    }

    fn prime(db: Database) -> Result<Self, StorageError> {
        let txn = db.begin_write().map_err(db_err)?;
        txn.open_table(DOCUMENTS).map_err(db_err)?;
        txn.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    fn decode(id: &str, raw: &str) -> Result<(String, StoredRecord), StorageError> {
        let body: DocBody = serde_json::from_str(raw).map_err(|e| {
            StorageError::MalformedStoredData(format!("document '{id}': {e}"))
        })?;
        let fields = match body.fields {
            Value::Object(map) => map,
            other => {
                return Err(StorageError::MalformedStoredData(format!(
                    "document '{id}' body is {other}, expected an object"
                )))
            }
        };
        Ok((
            body.record_type,
            StoredRecord {
                id: RecordId::Text(id.to_string()),
                fields,
                created_at: body.created_at,
                updated_at: body.updated_at,
            },
        ))
    }

    fn encode(
        record_type: &str,
        fields: &FieldMap,
        created_at: i64,
        updated_at: i64,
    ) -> Result<String, StorageError> {
        serde_json::to_string(&DocBody {
            record_type: record_type.to_string(),
            fields: Value::Object(fields.clone()),
            created_at,
            updated_at,
        })
        .map_err(|e| StorageError::UnsupportedType(e.to_string()))
    }

    fn scan(&self, record_type: &str) -> Result<Vec<StoredRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(DOCUMENTS).map_err(db_err)?;
        let mut records = Vec::new();
        for item in table.iter().map_err(db_err)? {
            let (key, value) = item.map_err(db_err)?;
            let (kind, record) = Self::decode(key.value(), value.value())?;
            if kind == record_type {
                records.push(record);
            }
        }
        records.sort_by_key(|r| Reverse((r.created_at, r.id.to_string())));
        Ok(records)
    }

    fn load(&self, id: &str) -> Result<Option<(String, StoredRecord)>, StorageError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(DOCUMENTS).map_err(db_err)?;
        match table.get(id).map_err(db_err)? {
            Some(guard) => Self::decode(id, guard.value()).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self, id: &str, body: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(DOCUMENTS).map_err(db_err)?;
            table.insert(id, body).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)
    }
}

#[async_trait]
impl RecordBackend for DocumentStore {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn ensure_collection(&self, _schema: &RecordSchema) -> Result<(), StorageError> {
        // Schemaless; the table already exists.
        Ok(())
    }

    async fn insert(
        &self,
        schema: &RecordSchema,
        fields: &FieldMap,
        created_at: i64,
        updated_at: i64,
    ) -> Result<RecordId, StorageError> {
        let id = uuid::Uuid::new_v4().to_string();
        let body = Self::encode(schema.record_type, fields, created_at, updated_at)?;
        self.store(&id, &body)?;
        Ok(RecordId::Text(id))
    }

    async fn fetch_all(&self, schema: &RecordSchema) -> Result<Vec<StoredRecord>, StorageError> {
        self.scan(schema.record_type)
    }

    async fn fetch_by_id(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let RecordId::Text(id) = id else {
            return Ok(None);
        };
        match self.load(id)? {
            Some((kind, record)) if kind == schema.record_type => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    async fn fetch_by_filter(
        &self,
        schema: &RecordSchema,
        criteria: &FieldMap,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let mut records = self.scan(schema.record_type)?;
        records.retain(|r| matches_criteria(&r.fields, criteria));
        Ok(records)
    }

    async fn update_fields(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
        fields: &FieldMap,
        updated_at: i64,
    ) -> Result<bool, StorageError> {
        let RecordId::Text(id) = id else {
            return Ok(false);
        };
        let Some((kind, mut record)) = self.load(id)? else {
            return Ok(false);
        };
        if kind != schema.record_type {
            return Ok(false);
        }
        for (key, value) in fields {
            record.fields.insert(key.clone(), value.clone());
        }
        let body = Self::encode(&kind, &record.fields, record.created_at, updated_at)?;
        self.store(id, &body)?;
        Ok(true)
    }

    async fn delete(&self, schema: &RecordSchema, id: &RecordId) -> Result<bool, StorageError> {
        let RecordId::Text(id) = id else {
            return Ok(false);
        };
        // Type check before removal so one collection cannot delete
        // another collection's document through a shared id.
        match self.load(id)? {
            Some((kind, _)) if kind == schema.record_type => {}
            _ => return Ok(false),
        }
        let txn = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = txn.open_table(DOCUMENTS).map_err(db_err)?;
            let removed = table.remove(id.as_str()).map_err(db_err)?.is_some();
            removed
        };
        txn.commit().map_err(db_err)?;
        Ok(removed)
    }

    async fn delete_many(
        &self,
        schema: &RecordSchema,
        ids: &[RecordId],
    ) -> Result<Vec<DeleteOutcome>, StorageError> {
        // One write transaction for the whole batch; a missing or
        // foreign document is an outcome, not a batch failure.
        let mut outcomes = Vec::with_capacity(ids.len());
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(DOCUMENTS).map_err(db_err)?;
            for id in ids {
                let result = match id {
                    RecordId::Text(raw) => {
                        let owned = match table.get(raw.as_str()).map_err(db_err) {
                            Ok(Some(guard)) => {
                                match Self::decode(raw, guard.value()) {
                                    Ok((kind, _)) => kind == schema.record_type,
                                    Err(e) => {
                                        outcomes.push(DeleteOutcome {
                                            id: id.clone(),
                                            result: Err(e),
                                        });
                                        continue;
                                    }
                                }
                            }
                            Ok(None) => false,
                            Err(e) => {
                                outcomes.push(DeleteOutcome {
                                    id: id.clone(),
                                    result: Err(e),
                                });
                                continue;
                            }
                        };
                        if owned {
                            table
                                .remove(raw.as_str())
                                .map_err(db_err)
                                .map(|old| old.is_some())
                        } else {
                            Ok(false)
                        }
                    }
                    RecordId::Int(_) => Ok(false),
                };
                outcomes.push(DeleteOutcome {
                    id: id.clone(),
                    result,
                });
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(outcomes)
    }
}
