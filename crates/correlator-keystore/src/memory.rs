//! In-memory `KeyStore`, used in tests and the degraded
//! no-store-configured mode.

use crate::{ApiKey, KeyStore, KeyStoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An in-process `KeyStore` backed by a `HashMap` keyed on `key_hash`.
///
/// `find_by_key` always hashes the candidate and performs one map lookup
/// regardless of outcome, so presence and absence cost the same.
#[derive(Default)]
pub struct InMemoryKeyStore {
    by_hash: RwLock<HashMap<String, ApiKey>>,
}

impl InMemoryKeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn find_by_key(&self, token: &str) -> Result<Option<ApiKey>, KeyStoreError> {
        let hash = crate::hash_key(token);
        let keys = self.by_hash.read().await;
        Ok(keys
            .get(&hash)
            .filter(|key| crate::hashes_match(&key.key_hash, &hash))
            .cloned())
    }

    async fn add(&self, key: ApiKey) -> Result<(), KeyStoreError> {
        let mut keys = self.by_hash.write().await;
        if keys.contains_key(&key.key_hash) || keys.values().any(|k| k.id == key.id) {
            return Err(KeyStoreError::Duplicate(key.id));
        }
        keys.insert(key.key_hash.clone(), key);
        Ok(())
    }

    async fn update(&self, key: ApiKey) -> Result<(), KeyStoreError> {
        let mut keys = self.by_hash.write().await;
        let existing_hash = keys
            .iter()
            .find(|(_, v)| v.id == key.id)
            .map(|(hash, _)| hash.clone())
            .ok_or_else(|| KeyStoreError::NotFound(key.id.clone()))?;
        if existing_hash != key.key_hash {
            keys.remove(&existing_hash);
        }
        keys.insert(key.key_hash.clone(), key);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), KeyStoreError> {
        let mut keys = self.by_hash.write().await;
        let entry = keys
            .values_mut()
            .find(|k| k.id == id)
            .ok_or_else(|| KeyStoreError::NotFound(id.to_string()))?;
        entry.active = false;
        Ok(())
    }

    async fn list_by_plugin(&self, plugin_id: &str) -> Result<Vec<ApiKey>, KeyStoreError> {
        let keys = self.by_hash.read().await;
        Ok(keys
            .values()
            .filter(|k| k.plugin_id == plugin_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), KeyStoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), KeyStoreError> {
        Ok(())
    }
}
