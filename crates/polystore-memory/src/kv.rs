use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use polystore_core::{KeyValueBackend, StorageError};

/// Process-local string store for the cache backend. Nothing survives a
/// restart.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueBackend for MemoryKvStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn remove_raw(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        self.entries.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::TypedStore;
    use serde_json::json;

    #[tokio::test]
    async fn typed_round_trip() {
        let store = TypedStore::new(MemoryKvStore::new());

        store.set_string("k", "v").await.unwrap();
        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("v"));

        store.set_number("n", 12.5).await.unwrap();
        assert_eq!(store.get_number("n").await.unwrap(), Some(12.5));

        store.set_boolean("b", true).await.unwrap();
        assert_eq!(store.get_boolean("b").await.unwrap(), Some(true));

        store.set_array("a", &["x", "y"]).await.unwrap();
        assert_eq!(
            store.get_array::<String>("a").await.unwrap().unwrap(),
            vec!["x".to_string(), "y".to_string()]
        );

        store.set_json("j", &json!({"hello": "cache"})).await.unwrap();
        assert_eq!(
            store.get_json::<serde_json::Value>("j").await.unwrap(),
            Some(json!({"hello": "cache"}))
        );
    }

    #[tokio::test]
    async fn type_mismatch_and_absence_return_none() {
        let store = TypedStore::new(MemoryKvStore::new());
        store.set_number("n", 7.0).await.unwrap();

        assert_eq!(store.get_string("n").await.unwrap(), None);
        assert_eq!(store.get_boolean("n").await.unwrap(), None);
        assert_eq!(store.get_array::<String>("n").await.unwrap(), None);
        assert_eq!(store.get_number("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let store = TypedStore::new(MemoryKvStore::new());
        store.set_string("a", "1").await.unwrap();
        store.set_string("b", "2").await.unwrap();

        store.remove("a").await.unwrap();
        assert_eq!(store.get_string("a").await.unwrap(), None);
        assert_eq!(store.get_string("b").await.unwrap().as_deref(), Some("2"));

        store.clear_all().await.unwrap();
        assert_eq!(store.get_string("b").await.unwrap(), None);
        assert!(store.backend().is_empty());
    }
}
