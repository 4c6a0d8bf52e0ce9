//! Generic CRUD engine, parameterized over a record backend and bound to
//! one schema descriptor.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{BulkDeleteOutcome, FieldMap, RecordBackend, RecordId, StoredRecord};
use crate::schema::RecordSchema;

/// System-managed keys stripped from caller-supplied field maps.
const SYSTEM_FIELDS: [&str; 4] = ["id", "type", "created_at", "updated_at"];

pub struct CrudEngine<B: RecordBackend + ?Sized> {
    backend: Arc<B>,
    schema: &'static RecordSchema,
}

impl<B: RecordBackend + ?Sized> CrudEngine<B> {
    /// Bind an engine to a backend and schema, running the idempotent
    /// collection setup once.
    pub async fn new(backend: Arc<B>, schema: &'static RecordSchema) -> Result<Self, StorageError> {
        backend.ensure_collection(schema).await?;
        Ok(Self { backend, schema })
    }

    pub fn schema(&self) -> &'static RecordSchema {
        self.schema
    }

    /// Create a record. Caller-supplied id/timestamps/discriminator are
    /// stripped; the input map is never mutated.
    pub async fn create(&self, data: &FieldMap) -> Result<RecordId, StorageError> {
        let fields = strip_system_fields(data);
        let now = now_ms();
        let id = self.backend.insert(self.schema, &fields, now, now).await?;
        tracing::debug!(
            backend = self.backend.name(),
            collection = self.schema.collection,
            id = %id,
            "record created"
        );
        Ok(id)
    }

    /// Every record of the bound type, newest-first where the backend
    /// defines an order.
    pub async fn read_all(&self) -> Result<Vec<StoredRecord>, StorageError> {
        self.backend.fetch_all(self.schema).await
    }

    pub async fn read_by_id(&self, id: &RecordId) -> Result<Option<StoredRecord>, StorageError> {
        self.backend.fetch_by_id(self.schema, id).await
    }

    /// AND-equality filter scoped to the bound type.
    pub async fn read_by_filter(
        &self,
        criteria: &FieldMap,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        // The discriminator is implied by the binding; a caller-supplied
        // one would otherwise never match on single-type backends.
        let mut criteria = criteria.clone();
        criteria.remove("type");
        self.backend.fetch_by_filter(self.schema, &criteria).await
    }

    /// Merge a partial field map into an existing record and refresh
    /// `updated_at`. Returns `false` for a missing id; never upserts.
    pub async fn update(&self, id: &RecordId, partial: &FieldMap) -> Result<bool, StorageError> {
        let fields = strip_system_fields(partial);
        self.backend
            .update_fields(self.schema, id, &fields, now_ms())
            .await
    }

    pub async fn delete(&self, id: &RecordId) -> Result<bool, StorageError> {
        self.backend.delete(self.schema, id).await
    }

    /// Delete every record of the bound type. An empty set is a complete
    /// success; item-level failures are reported without aborting the
    /// rest of the batch.
    pub async fn delete_all(&self) -> Result<BulkDeleteOutcome, StorageError> {
        let ids: Vec<RecordId> = self
            .read_all()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let mut outcome = BulkDeleteOutcome {
            attempted: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            return Ok(outcome);
        }
        for item in self.backend.delete_many(self.schema, &ids).await? {
            match item.result {
                Ok(true) => outcome.deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        backend = self.backend.name(),
                        collection = self.schema.collection,
                        id = %item.id,
                        error = %e,
                        "bulk delete item failed"
                    );
                    outcome.failures.push((item.id, e.to_string()));
                }
            }
        }
        Ok(outcome)
    }
}

fn strip_system_fields(data: &FieldMap) -> FieldMap {
    let mut fields = data.clone();
    for key in SYSTEM_FIELDS {
        fields.remove(key);
    }
    fields
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
