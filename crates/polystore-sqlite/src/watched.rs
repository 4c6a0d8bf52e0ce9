use async_trait::async_trait;
use tokio::sync::broadcast;

use polystore_core::{
    DeleteOutcome, FieldMap, RecordBackend, RecordId, RecordSchema, StorageError, StoredRecord,
};

use crate::relational::SqliteRecordStore;

/// What happened to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOp {
    Created,
    Updated,
    Deleted,
}

/// Emitted after every successful write on a watched store.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: &'static str,
    pub id: RecordId,
    pub op: ChangeOp,
}

/// Relational store that broadcasts a [`ChangeEvent`] after each
/// successful mutation. Reads pass straight through. Events are
/// best-effort: a send with no live subscribers is not an error.
pub struct WatchedSqliteStore {
    inner: SqliteRecordStore,
    changes: broadcast::Sender<ChangeEvent>,
}

impl WatchedSqliteStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let inner = SqliteRecordStore::open(path)?;
        let (changes, _) = broadcast::channel(64);
        Ok(Self { inner, changes })
    }

    /// Subscribe to change events. Each subscriber gets every event
    /// sent after the subscription was created.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn notify(&self, collection: &'static str, id: RecordId, op: ChangeOp) {
        let _ = self.changes.send(ChangeEvent { collection, id, op });
    }
}

#[async_trait]
impl RecordBackend for WatchedSqliteStore {
    fn name(&self) -> &'static str {
        "sqlite-watched"
    }

    async fn ensure_collection(&self, schema: &RecordSchema) -> Result<(), StorageError> {
        self.inner.ensure_collection(schema).await
    }

    async fn insert(
        &self,
        schema: &RecordSchema,
        fields: &FieldMap,
        created_at: i64,
        updated_at: i64,
    ) -> Result<RecordId, StorageError> {
        let id = self.inner.insert(schema, fields, created_at, updated_at).await?;
        self.notify(schema.collection, id.clone(), ChangeOp::Created);
        Ok(id)
    }

    async fn fetch_all(&self, schema: &RecordSchema) -> Result<Vec<StoredRecord>, StorageError> {
        self.inner.fetch_all(schema).await
    }

    async fn fetch_by_id(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
    ) -> Result<Option<StoredRecord>, StorageError> {
        self.inner.fetch_by_id(schema, id).await
    }

    async fn fetch_by_filter(
        &self,
        schema: &RecordSchema,
        criteria: &FieldMap,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        self.inner.fetch_by_filter(schema, criteria).await
    }

    async fn update_fields(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
        fields: &FieldMap,
        updated_at: i64,
    ) -> Result<bool, StorageError> {
        let updated = self
            .inner
            .update_fields(schema, id, fields, updated_at)
            .await?;
        if updated {
            self.notify(schema.collection, id.clone(), ChangeOp::Updated);
        }
        Ok(updated)
    }

    async fn delete(&self, schema: &RecordSchema, id: &RecordId) -> Result<bool, StorageError> {
        let deleted = self.inner.delete(schema, id).await?;
        if deleted {
            self.notify(schema.collection, id.clone(), ChangeOp::Deleted);
        }
        Ok(deleted)
    }

    async fn delete_many(
        &self,
        schema: &RecordSchema,
        ids: &[RecordId],
    ) -> Result<Vec<DeleteOutcome>, StorageError> {
        let outcomes = self.inner.delete_many(schema, ids).await?;
        for outcome in &outcomes {
            if matches!(outcome.result, Ok(true)) {
                self.notify(schema.collection, outcome.id.clone(), ChangeOp::Deleted);
            }
        }
        Ok(outcomes)
    }
}
