//! Polystore: one typed API over heterogeneous local storage engines.
//!
//! Scalars, arrays and JSON objects go through [`TypedStore`] into
//! key-value backends (plain file, encrypted file, in-memory cache).
//! Records go through [`CrudEngine`] into record backends (SQLite,
//! watched SQLite, redb documents, offline-first redb documents).
//! [`StoreManager`] hands out lazily opened singleton handles and
//! reports when a backend silently fell back to memory.

pub mod config;
pub mod entities;
pub mod logging;
pub mod manager;

pub use config::{Config, LoggingConfig, StorageConfig};
pub use manager::{BackendStatus, RecordHandle, StoreManager};

pub use polystore_core::{
    matches_criteria, BulkDeleteOutcome, CrudEngine, DeleteOutcome, FieldDescriptor, FieldKind,
    FieldMap, KeyPolicy, KeyValueBackend, RecordBackend, RecordId, RecordSchema, Reference,
    StorageError, StorageValue, StoredRecord, TypedStore,
};
pub use polystore_file::FileKvStore;
pub use polystore_memory::{MemoryKvStore, MemoryRecordStore};
pub use polystore_redb::{DocumentStore, OfflineDocumentStore};
pub use polystore_secure::{EncryptionKey, SecureKvStore};
pub use polystore_sqlite::{ChangeEvent, ChangeOp, SqliteRecordStore, WatchedSqliteStore};
