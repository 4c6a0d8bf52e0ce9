//! The generic record contract implemented by relational and document
//! backends.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;
use crate::schema::RecordSchema;

/// Field name to JSON value map, the flat storage shape of a record.
pub type FieldMap = serde_json::Map<String, Value>;

/// Backend-assigned record identity. Relational backends produce
/// auto-increment integers, document backends produce text ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RecordId::Int(i) => Some(*i),
            RecordId::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RecordId::Int(_) => None,
            RecordId::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "{i}"),
            RecordId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Text(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Text(id.to_string())
    }
}

/// A record as returned by a backend. Always a copy; mutating it does not
/// touch the stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub fields: FieldMap,
    /// Unix milliseconds, set once at creation.
    pub created_at: i64,
    /// Unix milliseconds, refreshed on every successful update.
    pub updated_at: i64,
}

/// Per-item result of a bulk delete. `Ok(false)` means the record was
/// already absent, which is not a failure.
#[derive(Debug)]
pub struct DeleteOutcome {
    pub id: RecordId,
    pub result: Result<bool, StorageError>,
}

/// Aggregated result of `delete_all`. An empty set is a complete success.
#[derive(Debug, Default)]
pub struct BulkDeleteOutcome {
    pub attempted: usize,
    pub deleted: usize,
    pub failures: Vec<(RecordId, String)>,
}

impl BulkDeleteOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// AND-combined equality match of `criteria` against `fields`.
pub fn matches_criteria(fields: &FieldMap, criteria: &FieldMap) -> bool {
    criteria.iter().all(|(key, want)| fields.get(key) == Some(want))
}

/// A native engine exposing record CRUD primitives for one or more
/// collections.
///
/// Implementations sharing one physical store across entity kinds must
/// check `schema.record_type` on every read/update/delete and treat a
/// mismatch exactly like "not found".
#[async_trait]
pub trait RecordBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Idempotent collection/table setup ("create if not exists").
    async fn ensure_collection(&self, schema: &RecordSchema) -> Result<(), StorageError>;

    /// Insert a record and return the backend-assigned id.
    async fn insert(
        &self,
        schema: &RecordSchema,
        fields: &FieldMap,
        created_at: i64,
        updated_at: i64,
    ) -> Result<RecordId, StorageError>;

    /// All records of the bound type, newest-first by creation time.
    async fn fetch_all(&self, schema: &RecordSchema) -> Result<Vec<StoredRecord>, StorageError>;

    async fn fetch_by_id(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
    ) -> Result<Option<StoredRecord>, StorageError>;

    /// Linear AND-equality filter. Backends with a native query layer may
    /// override this with an indexed implementation.
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

    /// Merge `fields` into an existing record. Returns whether the record
    /// existed; never creates one.
    async fn update_fields(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
        fields: &FieldMap,
        updated_at: i64,
    ) -> Result<bool, StorageError>;

    /// Hard-remove one record. Returns whether it existed.
    async fn delete(&self, schema: &RecordSchema, id: &RecordId) -> Result<bool, StorageError>;

    /// Delete a set of records, reporting each outcome individually. An
    /// item-level error must not abort sibling deletions. Backends with a
    /// native batch primitive override this with a single batched call.
    async fn delete_many(
        &self,
        schema: &RecordSchema,
        ids: &[RecordId],
    ) -> Result<Vec<DeleteOutcome>, StorageError> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            outcomes.push(DeleteOutcome {
                id: id.clone(),
                result: self.delete(schema, id).await,
            });
        }
        Ok(outcomes)
    }
}
