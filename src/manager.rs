//! Lazy singleton access to every backend. Each store is opened on
//! first use and cached; a failed open leaves the slot empty so the
//! next call retries instead of caching the failure.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use polystore_core::{RecordBackend, StorageError, TypedStore};
use polystore_file::FileKvStore;
use polystore_memory::{MemoryKvStore, MemoryRecordStore};
use polystore_redb::{DocumentStore, OfflineDocumentStore};
use polystore_secure::{EncryptionKey, SecureKvStore};
use polystore_sqlite::{SqliteRecordStore, WatchedSqliteStore};

use crate::config::StorageConfig;

/// Whether a handle is backed by its real engine or by the in-memory
/// stand-in after the real one failed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Native,
    Fallback,
}

/// A record backend plus where it actually lives.
#[derive(Clone)]
pub struct RecordHandle {
    pub store: Arc<dyn RecordBackend>,
    pub status: BackendStatus,
}

pub struct StoreManager {
    config: StorageConfig,
    flat: Mutex<Option<Arc<TypedStore<FileKvStore>>>>,
    secure: Mutex<Option<Arc<TypedStore<SecureKvStore>>>>,
    cache: Mutex<Option<Arc<TypedStore<MemoryKvStore>>>>,
    relational: Mutex<Option<Arc<SqliteRecordStore>>>,
    reactive: Mutex<Option<Arc<WatchedSqliteStore>>>,
    document: Mutex<Option<RecordHandle>>,
    offline: Mutex<Option<RecordHandle>>,
}

impl StoreManager {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            flat: Mutex::new(None),
            secure: Mutex::new(None),
            cache: Mutex::new(None),
            relational: Mutex::new(None),
            reactive: Mutex::new(None),
            document: Mutex::new(None),
            offline: Mutex::new(None),
        }
    }

    fn data_path(&self, file: &str) -> Result<PathBuf, StorageError> {
        std::fs::create_dir_all(&self.config.data_dir)?;
        Ok(self.config.data_dir.join(file))
    }

    /// Plain key-value store persisted as a JSON file.
    pub async fn flat_kv(&self) -> Result<Arc<TypedStore<FileKvStore>>, StorageError> {
        let mut slot = self.flat.lock().await;
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let path = self.data_path("flat.json")?;
        let store = Arc::new(TypedStore::new(FileKvStore::open(path)?));
        debug!(backend = "file", "opened key-value store");
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Encrypted key-value store. Requires a configured key.
    pub async fn secure_kv(&self) -> Result<Arc<TypedStore<SecureKvStore>>, StorageError> {
        let mut slot = self.secure.lock().await;
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let encoded = self.config.secure_key_base64.as_deref().ok_or_else(|| {
            StorageError::BackendUnavailable {
                backend: "secure",
                hint: "no encryption key configured".to_string(),
            }
        })?;
        let key = EncryptionKey::from_base64(encoded)?;
        let path = self.data_path("secure.json")?;
        let store = Arc::new(TypedStore::new(SecureKvStore::open(path, key)?));
        debug!(backend = "secure", "opened key-value store");
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Process-lifetime in-memory cache.
    pub async fn cache_kv(&self) -> Result<Arc<TypedStore<MemoryKvStore>>, StorageError> {
        let mut slot = self.cache.lock().await;
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let store = Arc::new(TypedStore::new(MemoryKvStore::new()));
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Relational record store. No memory fallback: schema guarantees
    /// like foreign keys cannot be imitated in memory.
    pub async fn relational(&self) -> Result<Arc<SqliteRecordStore>, StorageError> {
        let mut slot = self.relational.lock().await;
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let path = self.data_path("relational.db")?;
        let store = Arc::new(SqliteRecordStore::open(&path.to_string_lossy())?);
        debug!(backend = "sqlite", "opened record store");
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Relational store with change notifications. Kept separate from
    /// [`Self::relational`]; the two do not share a database file.
    pub async fn reactive(&self) -> Result<Arc<WatchedSqliteStore>, StorageError> {
        let mut slot = self.reactive.lock().await;
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let path = self.data_path("reactive.db")?;
        let store = Arc::new(WatchedSqliteStore::open(&path.to_string_lossy())?);
        debug!(backend = "sqlite-watched", "opened record store");
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Document store, with an observable in-memory fallback when the
    /// database file cannot be opened and fallback is enabled.
    pub async fn document(&self) -> Result<RecordHandle, StorageError> {
        let mut slot = self.document.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }
        let path = self.data_path("documents.redb")?;
        let handle = self.open_or_fall_back("document", || {
            DocumentStore::open(&path).map(|s| Arc::new(s) as Arc<dyn RecordBackend>)
        })?;
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Offline-first document store, same fallback policy as
    /// [`Self::document`]. Note the fallback keeps no revision history.
    pub async fn offline_document(&self) -> Result<RecordHandle, StorageError> {
        let mut slot = self.offline.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }
        let path = self.data_path("sync.redb")?;
        let handle = self.open_or_fall_back("offline-document", || {
            OfflineDocumentStore::open(&path).map(|s| Arc::new(s) as Arc<dyn RecordBackend>)
        })?;
        *slot = Some(handle.clone());
        Ok(handle)
    }

    fn open_or_fall_back(
        &self,
        backend: &'static str,
        open: impl FnOnce() -> Result<Arc<dyn RecordBackend>, StorageError>,
    ) -> Result<RecordHandle, StorageError> {
        match open() {
            Ok(store) => {
                debug!(backend, "opened record store");
                Ok(RecordHandle {
                    store,
                    status: BackendStatus::Native,
                })
            }
            Err(e) if self.config.fallback_to_memory => {
                warn!(backend, error = %e, "falling back to in-memory store");
                Ok(RecordHandle {
                    store: Arc::new(MemoryRecordStore::new()),
                    status: BackendStatus::Fallback,
                })
            }
            Err(e) => Err(e),
        }
    }
}
