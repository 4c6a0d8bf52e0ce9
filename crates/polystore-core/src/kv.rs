//! The typed scalar contract: a raw string-keyed backend trait plus the
//! typed facade layered over it.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codec;
use crate::error::StorageError;
use crate::keys;
use crate::value::StorageValue;

/// How a backend treats application-supplied keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Keys are passed to the native engine unchanged.
    Verbatim,
    /// Keys must match `^[A-Za-z0-9._-]+$` and are normalized first.
    Restricted,
}

/// A native engine exposing untyped string get/set primitives.
///
/// Absence is not an error: `get_raw` on a missing key returns `Ok(None)`.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn key_policy(&self) -> KeyPolicy {
        KeyPolicy::Verbatim
    }

    async fn put_raw(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn remove_raw(&self, key: &str) -> Result<(), StorageError>;

    /// Wipe the whole store. Backends without a native bulk-clear
    /// primitive fail with `NotSupported`.
    async fn clear_all(&self) -> Result<(), StorageError>;
}

/// Typed get/set facade over any [`KeyValueBackend`].
///
/// Every getter returns `Ok(None)` both for absent keys and for values
/// stored under a different type; a type mismatch is never an error.
pub struct TypedStore<B: KeyValueBackend> {
    backend: B,
}

impl<B: KeyValueBackend> TypedStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn storage_key(&self, key: &str) -> Result<String, StorageError> {
        match self.backend.key_policy() {
            KeyPolicy::Verbatim => Ok(key.to_string()),
            KeyPolicy::Restricted => keys::normalize(key),
        }
    }

    pub async fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let raw = codec::encode(&StorageValue::String(value.to_string()))?;
        self.backend.put_raw(&self.storage_key(key)?, &raw).await
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read(key).await?.and_then(|v| match v {
            StorageValue::String(s) => Some(s),
            _ => None,
        }))
    }

    pub async fn set_number(&self, key: &str, value: f64) -> Result<(), StorageError> {
        let raw = codec::encode(&StorageValue::Number(value))?;
        self.backend.put_raw(&self.storage_key(key)?, &raw).await
    }

    pub async fn get_number(&self, key: &str) -> Result<Option<f64>, StorageError> {
        Ok(self.read(key).await?.and_then(|v| v.as_number()))
    }

    pub async fn set_boolean(&self, key: &str, value: bool) -> Result<(), StorageError> {
        let raw = codec::encode(&StorageValue::Boolean(value))?;
        self.backend.put_raw(&self.storage_key(key)?, &raw).await
    }

    pub async fn get_boolean(&self, key: &str) -> Result<Option<bool>, StorageError> {
        Ok(self.read(key).await?.and_then(|v| v.as_boolean()))
    }

    pub async fn set_array<T: Serialize + Sync>(
        &self,
        key: &str,
        items: &[T],
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_value(items)
            .map_err(|e| StorageError::UnsupportedType(e.to_string()))?;
        let raw = codec::encode_json(&payload)?;
        self.backend.put_raw(&self.storage_key(key)?, &raw).await
    }

    pub async fn get_array<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<Vec<T>>, StorageError> {
        Ok(self.read(key).await?.and_then(|v| match v {
            StorageValue::Array(items) => serde_json::from_value(Value::Array(items)).ok(),
            _ => None,
        }))
    }

    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_value(value)
            .map_err(|e| StorageError::UnsupportedType(e.to_string()))?;
        if !payload.is_object() {
            return Err(StorageError::UnsupportedType(
                "set_json expects a JSON object".to_string(),
            ));
        }
        let raw = codec::encode_json(&payload)?;
        self.backend.put_raw(&self.storage_key(key)?, &raw).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        Ok(self.read(key).await?.and_then(|v| match v {
            StorageValue::Object(map) => serde_json::from_value(Value::Object(map)).ok(),
            _ => None,
        }))
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove_raw(&self.storage_key(key)?).await
    }

    pub async fn clear_all(&self) -> Result<(), StorageError> {
        self.backend.clear_all().await
    }

    async fn read(&self, key: &str) -> Result<Option<StorageValue>, StorageError> {
        let raw = self.backend.get_raw(&self.storage_key(key)?).await?;
        Ok(raw.map(|r| codec::decode(&r)))
    }
}
