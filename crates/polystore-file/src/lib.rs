//! Flat key-value backend persisted as a single JSON file, the durable
//! equivalent of a mobile platform's plain preference store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use polystore_core::{KeyValueBackend, StorageError};

pub struct FileKvStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileKvStore {
    /// Open (or create) the store at `path`. The parent directory is
    /// created if missing; failure to do so means the backend is
    /// unavailable in this environment.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::BackendUnavailable {
                backend: "file",
                hint: format!("cannot create '{}': {e}", parent.display()),
            })?;
        }
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                StorageError::MalformedStoredData(format!(
                    "'{}' is not a valid store file: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(StorageError::BackendUnavailable {
                    backend: "file",
                    hint: format!("cannot read '{}': {e}", path.display()),
                })
            }
        };
        tracing::debug!(path = %path.display(), "file store opened");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let contents =
            serde_json::to_string(entries).map_err(|e| StorageError::Other(e.to_string()))?;
        // Write-through via a sibling temp file so a crash mid-write
        // never truncates the live store.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for FileKvStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn put_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn remove_raw(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap();
        entries.clear();
        self.persist(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::TypedStore;

    fn temp_store() -> (tempfile::TempDir, TypedStore<FileKvStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = TypedStore::new(FileKvStore::open(dir.path().join("kv.json")).unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn set_get_remove_scenario() {
        let (_dir, store) = temp_store();
        store.set_string("k", "v").await.unwrap();
        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("v"));
        store.remove("k").await.unwrap();
        assert_eq!(store.get_string("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");

        let store = TypedStore::new(FileKvStore::open(&path).unwrap());
        store.set_number("count", 3.0).await.unwrap();
        store.set_array("tags", &["a", "b", "c"]).await.unwrap();
        drop(store);

        let reopened = TypedStore::new(FileKvStore::open(&path).unwrap());
        assert_eq!(reopened.get_number("count").await.unwrap(), Some(3.0));
        assert_eq!(
            reopened.get_array::<String>("tags").await.unwrap().unwrap(),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn clear_all_wipes_store() {
        let (_dir, store) = temp_store();
        store.set_string("a", "1").await.unwrap();
        store.set_string("b", "2").await.unwrap();
        store.clear_all().await.unwrap();
        assert_eq!(store.get_string("a").await.unwrap(), None);
        assert_eq!(store.get_string("b").await.unwrap(), None);
    }

    #[test]
    fn corrupt_store_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileKvStore::open(&path),
            Err(StorageError::MalformedStoredData(_))
        ));
    }
}
