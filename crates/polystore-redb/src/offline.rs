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

const SYNC_DOCUMENTS: TableDefinition<&str, &str> = TableDefinition::new("sync_documents");

/// Document body with sync bookkeeping. `rev` starts at 1 and every
/// mutation bumps it; deletes keep the body around as a tombstone so a
/// later reconciliation pass can propagate the removal.
#[derive(Serialize, Deserialize)]
struct SyncDocBody {
    #[serde(rename = "type")]
    record_type: String,
    fields: Value,
    created_at: i64,
    updated_at: i64,
    rev: u64,
    #[serde(default)]
    deleted: bool,
}

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(e.to_string())
}

/// Offline-first document store. Reads hide tombstones; writes bump
/// per-document revision counters.
pub struct OfflineDocumentStore {
    db: Database,
}

impl OfflineDocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(&path).map_err(|e| StorageError::BackendUnavailable {
            backend: "offline-document",
            hint: format!("cannot open '{}': {e}", path.as_ref().display()),
        })?;
        tracing::debug!(path = %path.as_ref().display(), "offline document store opened");
        Self::prime(db)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(db_err)?;
        Self::prime(db)
    }

    fn prime(db: Database) -> Result<Self, StorageError> {
        let txn = db.begin_write().map_err(db_err)?;
        txn.open_table(SYNC_DOCUMENTS).map_err(db_err)?;
        txn.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// Current revision of a document, tombstones included. `None` if
    /// the id was never written.
    pub fn revision(&self, id: &RecordId) -> Result<Option<u64>, StorageError> {
        let RecordId::Text(id) = id else {
            return Ok(None);
        };
        Ok(self.load(id)?.map(|body| body.rev))
    }

    fn decode(id: &str, raw: &str) -> Result<SyncDocBody, StorageError> {
        serde_json::from_str(raw)
            .map_err(|e| StorageError::MalformedStoredData(format!("document '{id}': {e}")))
    }

    fn load(&self, id: &str) -> Result<Option<SyncDocBody>, StorageError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(SYNC_DOCUMENTS).map_err(db_err)?;
        match table.get(id).map_err(db_err)? {
            Some(guard) => Self::decode(id, guard.value()).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self, id: &str, body: &SyncDocBody) -> Result<(), StorageError> {
        let raw = serde_json::to_string(body)
            .map_err(|e| StorageError::UnsupportedType(e.to_string()))?;
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(SYNC_DOCUMENTS).map_err(db_err)?;
            table.insert(id, raw.as_str()).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)
    }

    fn to_record(id: &str, body: SyncDocBody) -> Result<StoredRecord, StorageError> {
        let fields = match body.fields {
            Value::Object(map) => map,
            other => {
                return Err(StorageError::MalformedStoredData(format!(
                    "document '{id}' body is {other}, expected an object"
                )))
            }
        };
        Ok(StoredRecord {
            id: RecordId::Text(id.to_string()),
            fields,
            created_at: body.created_at,
            updated_at: body.updated_at,
        })
    }

    fn scan_live(&self, record_type: &str) -> Result<Vec<StoredRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(SYNC_DOCUMENTS).map_err(db_err)?;
        let mut records = Vec::new();
        for item in table.iter().map_err(db_err)? {
            let (key, value) = item.map_err(db_err)?;
            let body = Self::decode(key.value(), value.value())?;
            if body.deleted || body.record_type != record_type {
                continue;
            }
            records.push(Self::to_record(key.value(), body)?);
        }
        records.sort_by_key(|r| Reverse((r.created_at, r.id.to_string())));
        Ok(records)
    }

    // Tombstone a live document of the right type inside an already
    // open table. Returns false if there is nothing live to delete.
    fn tombstone_in(
        table: &mut redb::Table<'_, &str, &str>,
        record_type: &str,
        id: &str,
        now: i64,
    ) -> Result<bool, StorageError> {
        let mut body = match table.get(id).map_err(db_err)? {
            Some(guard) => Self::decode(id, guard.value())?,
            None => return Ok(false),
        };
        if body.deleted || body.record_type != record_type {
            return Ok(false);
        }
        body.deleted = true;
        body.rev += 1;
        body.updated_at = now;
        let raw = serde_json::to_string(&body)
            .map_err(|e| StorageError::UnsupportedType(e.to_string()))?;
        table.insert(id, raw.as_str()).map_err(db_err)?;
        Ok(true)
    }
}

#[async_trait]
impl RecordBackend for OfflineDocumentStore {
    fn name(&self) -> &'static str {
        "offline-document"
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
        let id = uuid::Uuid::new_v4().to_string();
        self.store(
            &id,
            &SyncDocBody {
                record_type: schema.record_type.to_string(),
                fields: Value::Object(fields.clone()),
                created_at,
                updated_at,
                rev: 1,
                deleted: false,
            },
        )?;
        Ok(RecordId::Text(id))
    }

    async fn fetch_all(&self, schema: &RecordSchema) -> Result<Vec<StoredRecord>, StorageError> {
        self.scan_live(schema.record_type)
    }

    async fn fetch_by_id(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let RecordId::Text(raw) = id else {
            return Ok(None);
        };
        match self.load(raw)? {
            Some(body) if !body.deleted && body.record_type == schema.record_type => {
                Self::to_record(raw, body).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn fetch_by_filter(
        &self,
        schema: &RecordSchema,
        criteria: &FieldMap,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let mut records = self.scan_live(schema.record_type)?;
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
        let RecordId::Text(raw) = id else {
            return Ok(false);
        };
        let Some(mut body) = self.load(raw)? else {
            return Ok(false);
        };
        if body.deleted || body.record_type != schema.record_type {
            return Ok(false);
        }
        let mut merged = match body.fields {
            Value::Object(map) => map,
            other => {
                return Err(StorageError::MalformedStoredData(format!(
                    "document '{raw}' body is {other}, expected an object"
                )))
            }
        };
        for (key, value) in fields {
            merged.insert(key.clone(), value.clone());
        }
        body.fields = Value::Object(merged);
        body.updated_at = updated_at;
        body.rev += 1;
        self.store(raw, &body)?;
        Ok(true)
    }

    async fn delete(&self, schema: &RecordSchema, id: &RecordId) -> Result<bool, StorageError> {
        let RecordId::Text(raw) = id else {
            return Ok(false);
        };
        let stamp = match self.load(raw)? {
            Some(body) => body.updated_at,
            None => return Ok(false),
        };
        let txn = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = txn.open_table(SYNC_DOCUMENTS).map_err(db_err)?;
            Self::tombstone_in(&mut table, schema.record_type, raw, stamp)?
        };
        txn.commit().map_err(db_err)?;
        Ok(removed)
    }

    async fn delete_many(
        &self,
        schema: &RecordSchema,
        ids: &[RecordId],
    ) -> Result<Vec<DeleteOutcome>, StorageError> {
        let mut outcomes = Vec::with_capacity(ids.len());
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(SYNC_DOCUMENTS).map_err(db_err)?;
            for id in ids {
                let result = match id {
                    RecordId::Text(raw) => {
                        // Tombstones keep the stored timestamp.
                        let now = match table.get(raw.as_str()).map_err(db_err) {
                            Ok(Some(guard)) => match Self::decode(raw, guard.value()) {
                                Ok(body) => body.updated_at,
                                Err(e) => {
                                    outcomes.push(DeleteOutcome {
                                        id: id.clone(),
                                        result: Err(e),
                                    });
                                    continue;
                                }
                            },
                            Ok(None) => {
                                outcomes.push(DeleteOutcome {
                                    id: id.clone(),
                                    result: Ok(false),
                                });
                                continue;
                            }
                            Err(e) => {
                                outcomes.push(DeleteOutcome {
                                    id: id.clone(),
                                    result: Err(e),
                                });
                                continue;
                            }
                        };
                        Self::tombstone_in(&mut table, schema.record_type, raw, now)
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

    fn fields(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn revisions_advance_with_every_mutation() {
        let store = Arc::new(OfflineDocumentStore::open_in_memory().unwrap());
        let users = CrudEngine::new(store.clone(), &USERS).await.unwrap();

        let id = users
            .create(&fields(&[("name", json!("John")), ("age", json!(30))]))
            .await
            .unwrap();
        assert_eq!(store.revision(&id).unwrap(), Some(1));

        users
            .update(&id, &fields(&[("age", json!(31))]))
            .await
            .unwrap();
        assert_eq!(store.revision(&id).unwrap(), Some(2));

        users.delete(&id).await.unwrap();
        assert_eq!(store.revision(&id).unwrap(), Some(3));
    }

    #[tokio::test]
    async fn tombstones_are_invisible_to_reads() {
        let store = Arc::new(OfflineDocumentStore::open_in_memory().unwrap());
        let users = CrudEngine::new(store.clone(), &USERS).await.unwrap();

        let id = users
            .create(&fields(&[("name", json!("gone")), ("age", json!(1))]))
            .await
            .unwrap();
        assert!(users.delete(&id).await.unwrap());

        assert!(users.read_by_id(&id).await.unwrap().is_none());
        assert!(users.read_all().await.unwrap().is_empty());
        assert!(users
            .read_by_filter(&fields(&[("name", json!("gone"))]))
            .await
            .unwrap()
            .is_empty());
        // The tombstone itself is still tracked.
        assert_eq!(store.revision(&id).unwrap(), Some(2));

        // A second delete of the same id reports nothing removed.
        assert!(!users.delete(&id).await.unwrap());
        assert_eq!(store.revision(&id).unwrap(), Some(2));
    }

    #[tokio::test]
    async fn deleted_documents_reject_updates() {
        let store = Arc::new(OfflineDocumentStore::open_in_memory().unwrap());
        let users = CrudEngine::new(store, &USERS).await.unwrap();

        let id = users
            .create(&fields(&[("name", json!("x")), ("age", json!(1))]))
            .await
            .unwrap();
        users.delete(&id).await.unwrap();
        assert!(!users
            .update(&id, &fields(&[("age", json!(2))]))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn bulk_delete_tombstones_everything() {
        let store = Arc::new(OfflineDocumentStore::open_in_memory().unwrap());
        let users = CrudEngine::new(store, &USERS).await.unwrap();
        users
            .create(&fields(&[("name", json!("a")), ("age", json!(1))]))
            .await
            .unwrap();
        users
            .create(&fields(&[("name", json!("b")), ("age", json!(2))]))
            .await
            .unwrap();

        let outcome = users.delete_all().await.unwrap();
        assert_eq!(outcome.deleted, 2);
        assert!(outcome.is_complete());
        assert!(users.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.redb");
        let (live, dead) = {
            let store = Arc::new(OfflineDocumentStore::open(&path).unwrap());
            let users = CrudEngine::new(store, &USERS).await.unwrap();
            let live = users
                .create(&fields(&[("name", json!("live")), ("age", json!(1))]))
                .await
                .unwrap();
            let dead = users
                .create(&fields(&[("name", json!("dead")), ("age", json!(2))]))
                .await
                .unwrap();
            users.delete(&dead).await.unwrap();
            (live, dead)
        };
        let store = Arc::new(OfflineDocumentStore::open(&path).unwrap());
        let users = CrudEngine::new(store.clone(), &USERS).await.unwrap();
        assert!(users.read_by_id(&live).await.unwrap().is_some());
        assert!(users.read_by_id(&dead).await.unwrap().is_none());
        assert_eq!(store.revision(&dead).unwrap(), Some(2));
    }
}
