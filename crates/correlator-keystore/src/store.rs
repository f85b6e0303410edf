//! The `KeyStore` interface shared by the in-memory and persistent
//! implementations.

use crate::{ApiKey, KeyStoreError};
use async_trait::async_trait;

/// Persists and serves API keys to the authentication middleware.
///
/// Both implementations in this crate ([`crate::InMemoryKeyStore`] and
/// [`crate::SqlxKeyStore`]) share these observable semantics: `find_by_key`
/// never panics and completes in time independent of whether the key
/// exists; `delete` is a soft-delete that flips `active` rather than
/// removing the row.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Looks up a key by its raw token. Returns `None` if no key's digest
    /// matches — never distinguishes "malformed" from "not found" at this
    /// layer; that judgment belongs to the caller.
    async fn find_by_key(&self, token: &str) -> Result<Option<ApiKey>, KeyStoreError>;

    /// Persists a new key. Rejects a duplicate `id` or `key_hash`.
    async fn add(&self, key: ApiKey) -> Result<(), KeyStoreError>;

    /// Overwrites an existing key by `id`.
    async fn update(&self, key: ApiKey) -> Result<(), KeyStoreError>;

    /// Soft-deletes a key by `id`, setting `active = false`.
    async fn delete(&self, id: &str) -> Result<(), KeyStoreError>;

    /// Lists every key (active or not) belonging to `plugin_id`.
    async fn list_by_plugin(&self, plugin_id: &str) -> Result<Vec<ApiKey>, KeyStoreError>;

    /// Probes the backing store's reachability.
    async fn health_check(&self) -> Result<(), KeyStoreError>;

    /// Releases any held connections. A no-op for the in-memory store.
    async fn close(&self) -> Result<(), KeyStoreError>;
}
