//! Encrypted key-value backend: per-value AES-256-GCM over the flat file
//! store, with the restricted key charset secure stores impose.
//!
//! There is deliberately no bulk clear: the underlying secure store has
//! no such primitive, so `clear_all` fails with `NotSupported` and
//! callers must track and remove known keys individually.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::path::Path;

use polystore_core::{KeyPolicy, KeyValueBackend, StorageError};
use polystore_file::FileKvStore;

pub const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// 256-bit encryption key.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, StorageError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| StorageError::Other(format!("invalid key encoding: {e}")))?;
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| StorageError::Other(format!("key must be {KEY_SIZE} bytes")))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("EncryptionKey(..)")
    }
}

pub struct SecureKvStore {
    inner: FileKvStore,
    cipher: Aes256Gcm,
}

impl SecureKvStore {
    pub fn open(path: impl AsRef<Path>, key: EncryptionKey) -> Result<Self, StorageError> {
        let inner = FileKvStore::open(path).map_err(|e| match e {
            StorageError::BackendUnavailable { hint, .. } => StorageError::BackendUnavailable {
                backend: "secure",
                hint,
            },
            other => other,
        })?;
        let cipher = Aes256Gcm::new((&key.0).into());
        tracing::debug!(path = %inner.path().display(), "secure store opened");
        Ok(Self { inner, cipher })
    }

    fn seal(&self, plaintext: &str) -> Result<String, StorageError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| StorageError::Other("encryption failure".to_string()))?;
        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    fn unseal(&self, stored: &str) -> Result<String, StorageError> {
        let blob = BASE64
            .decode(stored)
            .map_err(|e| StorageError::MalformedStoredData(format!("bad ciphertext: {e}")))?;
        if blob.len() < NONCE_SIZE {
            return Err(StorageError::MalformedStoredData(
                "ciphertext shorter than nonce".to_string(),
            ));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                StorageError::MalformedStoredData("ciphertext corrupt or wrong key".to_string())
            })?;
        String::from_utf8(plaintext)
            .map_err(|e| StorageError::MalformedStoredData(e.to_string()))
    }
}

#[async_trait]
impl KeyValueBackend for SecureKvStore {
    fn name(&self) -> &'static str {
        "secure"
    }

    fn key_policy(&self) -> KeyPolicy {
        KeyPolicy::Restricted
    }

    async fn put_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let sealed = self.seal(value)?;
        self.inner.put_raw(key, &sealed).await
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.inner.get_raw(key).await? {
            Some(stored) => self.unseal(&stored).map(Some),
            None => Ok(None),
        }
    }

    async fn remove_raw(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_raw(key).await
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        Err(StorageError::NotSupported {
            backend: "secure",
            operation: "clear_all",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::TypedStore;
    use serde_json::json;

    fn key() -> EncryptionKey {
        EncryptionKey::from_bytes([7u8; KEY_SIZE])
    }

    fn temp_store() -> (tempfile::TempDir, TypedStore<SecureKvStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            TypedStore::new(SecureKvStore::open(dir.path().join("secure.json"), key()).unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn round_trip_all_types() {
        let (_dir, store) = temp_store();
        store.set_string("s", "secret").await.unwrap();
        store.set_number("n", 9.0).await.unwrap();
        store.set_boolean("b", false).await.unwrap();
        store.set_json("j", &json!({"pin": 1234})).await.unwrap();

        assert_eq!(store.get_string("s").await.unwrap().as_deref(), Some("secret"));
        assert_eq!(store.get_number("n").await.unwrap(), Some(9.0));
        assert_eq!(store.get_boolean("b").await.unwrap(), Some(false));
        assert_eq!(
            store.get_json::<serde_json::Value>("j").await.unwrap(),
            Some(json!({"pin": 1234}))
        );
    }

    #[tokio::test]
    async fn keys_are_normalized() {
        let (_dir, store) = temp_store();
        store.set_string("user name!", "Ada").await.unwrap();
        // The restricted charset maps both spellings to the same key.
        assert_eq!(
            store.get_string("user_name_").await.unwrap().as_deref(),
            Some("Ada")
        );
        assert!(store.set_string("", "x").await.is_err());
    }

    #[tokio::test]
    async fn clear_all_is_not_supported() {
        let (_dir, store) = temp_store();
        store.set_string("k", "v").await.unwrap();
        assert!(matches!(
            store.clear_all().await,
            Err(StorageError::NotSupported { .. })
        ));
        // The store state is untouched by the failed call.
        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn ciphertext_is_opaque_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secure.json");
        let store = TypedStore::new(SecureKvStore::open(&path, key()).unwrap());
        store.set_string("k", "visible-secret").await.unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("visible-secret"));
    }

    #[tokio::test]
    async fn wrong_key_is_malformed_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secure.json");
        let store = TypedStore::new(SecureKvStore::open(&path, key()).unwrap());
        store.set_string("k", "v").await.unwrap();
        drop(store);

        let other = TypedStore::new(
            SecureKvStore::open(&path, EncryptionKey::from_bytes([9u8; KEY_SIZE])).unwrap(),
        );
        assert!(matches!(
            other.get_string("k").await,
            Err(StorageError::MalformedStoredData(_))
        ));
    }
}
