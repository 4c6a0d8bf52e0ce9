use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

use polystore_core::{
    DeleteOutcome, FieldDescriptor, FieldKind, FieldMap, RecordBackend, RecordId, RecordSchema,
    StorageError, StoredRecord,
};

/// Relational adapter. Schema descriptors drive the DDL and the
/// column/field mapping: booleans live as INTEGER 0/1 and are coerced
/// back on read, JSON fields live as TEXT, and declared references
/// become real foreign keys (the one backend where the association is
/// enforced, including cascade).
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open a database file, or an in-memory database for `":memory:"`.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::BackendUnavailable {
            backend: "sqlite",
            hint: format!("cannot open '{path}': {e}"),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(db_err)?;
        tracing::debug!(path, "sqlite store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn build_ddl(schema: &RecordSchema) -> String {
        let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        for field in schema.fields {
            columns.push(column_ddl(field));
        }
        columns.push("created_at INTEGER NOT NULL".to_string());
        columns.push("updated_at INTEGER NOT NULL".to_string());
        for field in schema.fields {
            if let Some(reference) = field.references {
                let cascade = if reference.cascade {
                    " ON DELETE CASCADE"
                } else {
                    ""
                };
                columns.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {} (id){}",
                    field.name, reference.collection, cascade
                ));
            }
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);\nCREATE INDEX IF NOT EXISTS idx_{}_created ON {} (created_at DESC);",
            schema.collection,
            columns.join(",\n    "),
            schema.collection,
            schema.collection
        )
    }

    fn select_sql(schema: &RecordSchema, where_clause: &str) -> String {
        let mut cols = vec!["id", "created_at", "updated_at"];
        cols.extend(schema.fields.iter().map(|f| f.name));
        format!(
            "SELECT {} FROM {}{} ORDER BY created_at DESC, id DESC",
            cols.join(", "),
            schema.collection,
            where_clause
        )
    }

    fn row_to_record(
        schema: &RecordSchema,
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<StoredRecord> {
        let id: i64 = row.get(0)?;
        let created_at: i64 = row.get(1)?;
        let updated_at: i64 = row.get(2)?;
        let mut fields = FieldMap::new();
        for (i, field) in schema.fields.iter().enumerate() {
            let raw: SqlValue = row.get(3 + i)?;
            if let Some(value) = from_column(field.kind, raw) {
                fields.insert(field.name.to_string(), value);
            }
        }
        Ok(StoredRecord {
            id: RecordId::Int(id),
            fields,
            created_at,
            updated_at,
        })
    }
}

fn column_ddl(field: &FieldDescriptor) -> String {
    let sql_type = match field.kind {
        FieldKind::Text | FieldKind::Json => "TEXT",
        FieldKind::Integer | FieldKind::Boolean => "INTEGER",
        FieldKind::Real => "REAL",
    };
    let not_null = if field.required { " NOT NULL" } else { "" };
    format!("{} {}{}", field.name, sql_type, not_null)
}

fn to_column(field: &FieldDescriptor, value: &Value) -> Result<SqlValue, StorageError> {
    let column = match (field.kind, value) {
        (_, Value::Null) => SqlValue::Null,
        (FieldKind::Text, Value::String(s)) => SqlValue::Text(s.clone()),
        (FieldKind::Integer, Value::Number(n)) => SqlValue::Integer(n.as_i64().ok_or_else(
            || StorageError::UnsupportedType(format!("field '{}' expects an integer", field.name)),
        )?),
        (FieldKind::Real, Value::Number(n)) => SqlValue::Real(n.as_f64().ok_or_else(|| {
            StorageError::UnsupportedType(format!("field '{}' expects a number", field.name))
        })?),
        (FieldKind::Boolean, Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        (FieldKind::Json, Value::String(s)) => SqlValue::Text(s.clone()),
        (FieldKind::Json, v) => SqlValue::Text(
            serde_json::to_string(v).map_err(|e| StorageError::UnsupportedType(e.to_string()))?,
        ),
        (kind, v) => {
            return Err(StorageError::UnsupportedType(format!(
                "field '{}' expects {:?}, got {}",
                field.name, kind, v
            )))
        }
    };
    Ok(column)
}

fn from_column(kind: FieldKind, value: SqlValue) -> Option<Value> {
    match (kind, value) {
        (_, SqlValue::Null) => None,
        (FieldKind::Boolean, SqlValue::Integer(i)) => Some(Value::Bool(i != 0)),
        (FieldKind::Integer, SqlValue::Integer(i)) => Some(Value::from(i)),
        (FieldKind::Real, SqlValue::Real(f)) => serde_json::Number::from_f64(f).map(Value::Number),
        (FieldKind::Real, SqlValue::Integer(i)) => {
            serde_json::Number::from_f64(i as f64).map(Value::Number)
        }
        (FieldKind::Text | FieldKind::Json, SqlValue::Text(s)) => Some(Value::String(s)),
        _ => None,
    }
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

#[async_trait]
impl RecordBackend for SqliteRecordStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn ensure_collection(&self, schema: &RecordSchema) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(&Self::build_ddl(schema)).map_err(db_err)
    }

    async fn insert(
        &self,
        schema: &RecordSchema,
        fields: &FieldMap,
        created_at: i64,
        updated_at: i64,
    ) -> Result<RecordId, StorageError> {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for field in schema.fields {
            if let Some(value) = fields.get(field.name) {
                columns.push(field.name);
                values.push(to_column(field, value)?);
            }
        }
        columns.push("created_at");
        values.push(SqlValue::Integer(created_at));
        columns.push("updated_at");
        values.push(SqlValue::Integer(updated_at));

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.collection,
            columns.join(", "),
            placeholders.join(", ")
        );

        let conn = self.conn.lock().unwrap();
        conn.execute(&sql, params_from_iter(values)).map_err(db_err)?;
        Ok(RecordId::Int(conn.last_insert_rowid()))
    }

    async fn fetch_all(&self, schema: &RecordSchema) -> Result<Vec<StoredRecord>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&Self::select_sql(schema, ""))
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Self::row_to_record(schema, row))
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    async fn fetch_by_id(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let Some(id) = id.as_int() else {
            // Text ids never exist in a rowid table.
            return Ok(None);
        };
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&Self::select_sql(schema, " WHERE id = ?1"))
            .map_err(db_err)?;
        let mut rows = stmt
            .query_map([id], |row| Self::row_to_record(schema, row))
            .map_err(db_err)?;
        match rows.next() {
            Some(record) => Ok(Some(record.map_err(db_err)?)),
            None => Ok(None),
        }
    }

    async fn fetch_by_filter(
        &self,
        schema: &RecordSchema,
        criteria: &FieldMap,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        if criteria.is_empty() {
            return self.fetch_all(schema).await;
        }
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        for (key, value) in criteria {
            let Some(field) = schema.field(key) else {
                // An unknown field matches no stored record.
                return Ok(Vec::new());
            };
            match to_column(field, value) {
                Ok(column) => {
                    clauses.push(format!("{} = ?{}", field.name, values.len() + 1));
                    values.push(column);
                }
                // A criterion of the wrong type matches nothing.
                Err(_) => return Ok(Vec::new()),
            }
        }
        let where_clause = format!(" WHERE {}", clauses.join(" AND "));
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&Self::select_sql(schema, &where_clause))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Self::row_to_record(schema, row)
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    async fn update_fields(
        &self,
        schema: &RecordSchema,
        id: &RecordId,
        fields: &FieldMap,
        updated_at: i64,
    ) -> Result<bool, StorageError> {
        let Some(id) = id.as_int() else {
            return Ok(false);
        };
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for field in schema.fields {
            if let Some(value) = fields.get(field.name) {
                values.push(to_column(field, value)?);
                assignments.push(format!("{} = ?{}", field.name, values.len()));
            }
        }
        values.push(SqlValue::Integer(updated_at));
        assignments.push(format!("updated_at = ?{}", values.len()));
        values.push(SqlValue::Integer(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            schema.collection,
            assignments.join(", "),
            values.len()
        );

        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(&sql, params_from_iter(values))
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    async fn delete(&self, schema: &RecordSchema, id: &RecordId) -> Result<bool, StorageError> {
        let Some(id) = id.as_int() else {
            return Ok(false);
        };
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", schema.collection),
                [id],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    async fn delete_many(
        &self,
        schema: &RecordSchema,
        ids: &[RecordId],
    ) -> Result<Vec<DeleteOutcome>, StorageError> {
        // One SAVEPOINT per batch; item misses are outcomes, not errors.
        let mut outcomes = Vec::with_capacity(ids.len());
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("SAVEPOINT bulk_delete").map_err(db_err)?;
        for id in ids {
            let result = match id.as_int() {
                Some(raw) => conn
                    .execute(
                        &format!("DELETE FROM {} WHERE id = ?1", schema.collection),
                        [raw],
                    )
                    .map(|changed| changed > 0)
                    .map_err(db_err),
                None => Ok(false),
            };
            outcomes.push(DeleteOutcome {
                id: id.clone(),
                result,
            });
        }
        conn.execute_batch("RELEASE SAVEPOINT bulk_delete")
            .map_err(db_err)?;
        Ok(outcomes)
    }
}
