//! Key-value store abstraction

use super::keys::KeySpace;
use crate::error::{StoreError, StoreResult};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// TTL-capable key-value backend
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn put(&self, key: &str, value: Value, ttl_secs: u64) -> StoreResult<()>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Live keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> StoreResult<u64> {
        Ok(0)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Some backends hand back `{}`, `""` or `null` for missing keys
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Backend handle plus key scheme, shared by every handler
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn KvBackend>,
    keys: KeySpace,
}

impl Store {
    pub fn new(backend: Arc<dyn KvBackend>, keys: KeySpace) -> Self {
        Self { backend, keys }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Read a value; empty values read as absent
    pub async fn get_raw(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .backend
            .get(key)
            .await?
            .filter(|value| !is_empty_value(value)))
    }

    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get_raw(key).await?.is_some())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get_raw(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Serialization {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.backend.put(key, value, ttl_secs).await
    }

    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        self.backend.delete(key).await
    }

    /// Keys under a namespaced prefix
    pub async fn scan(&self, raw_prefix: &str) -> StoreResult<Vec<String>> {
        self.backend.keys(&self.keys.prefix(raw_prefix)).await
    }
}
