//! Core types and traits shared by every Polystore backend.
//!
//! The layering mirrors the adapter design: the value codec and key
//! normalizer are leaves, the backend traits sit on top of them, and the
//! generic CRUD engine is parameterized over any record backend.

pub mod codec;
pub mod engine;
pub mod error;
pub mod keys;
pub mod kv;
pub mod record;
pub mod schema;
pub mod value;

pub use engine::CrudEngine;
pub use error::StorageError;
pub use kv::{KeyPolicy, KeyValueBackend, TypedStore};
pub use record::{
    matches_criteria, BulkDeleteOutcome, DeleteOutcome, FieldMap, RecordBackend, RecordId,
    StoredRecord,
};
pub use schema::{FieldDescriptor, FieldKind, RecordSchema, Reference};
pub use value::StorageValue;
