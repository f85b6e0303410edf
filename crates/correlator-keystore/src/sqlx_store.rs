//! `SqlitePool`-backed `KeyStore`, standing in for the real migrator-prepared
//! relational store so the crate is self-contained and testable without an
//! external Postgres instance.

use crate::{ApiKey, KeyStore, KeyStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    key_hash TEXT NOT NULL UNIQUE,
    plugin_id TEXT NOT NULL,
    name TEXT NOT NULL,
    permissions TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT,
    active INTEGER NOT NULL
)
"#;

/// `KeyStore` implementation backed by a `sqlx::SqlitePool`.
///
/// Schema creation for production deployments is the separate migrator's
/// job; [`Self::ensure_schema`] exists so this crate can stand alone in
/// tests and single-binary deployments.
pub struct SqlxKeyStore {
    pool: SqlitePool,
}

impl SqlxKeyStore {
    /// Wraps an already-connected pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the `api_keys` table if it does not already exist.
    pub async fn ensure_schema(&self) -> Result<(), KeyStoreError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_key(row: &sqlx::sqlite::SqliteRow) -> Result<ApiKey, KeyStoreError> {
        let permissions_json: String = row.try_get("permissions")?;
        let permissions: BTreeSet<String> = serde_json::from_str(&permissions_json)
            .map_err(|e| KeyStoreError::Storage(format!("corrupt permissions column: {e}")))?;

        let created_at_raw: String = row.try_get("created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
            .map_err(|e| KeyStoreError::Storage(format!("corrupt created_at column: {e}")))?
            .with_timezone(&Utc);

        let expires_at_raw: Option<String> = row.try_get("expires_at")?;
        let expires_at = expires_at_raw
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| KeyStoreError::Storage(format!("corrupt expires_at column: {e}")))
            })
            .transpose()?;

        Ok(ApiKey {
            id: row.try_get("id")?,
            key_hash: row.try_get("key_hash")?,
            plugin_id: row.try_get("plugin_id")?,
            name: row.try_get("name")?,
            permissions,
            created_at,
            expires_at,
            active: row.try_get::<i64, _>("active")? != 0,
        })
    }
}

#[async_trait]
impl KeyStore for SqlxKeyStore {
    async fn find_by_key(&self, token: &str) -> Result<Option<ApiKey>, KeyStoreError> {
        let hash = crate::hash_key(token);
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_hash = ?")
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?;
        let key = row.as_ref().map(Self::row_to_key).transpose()?;
        Ok(key.filter(|key| crate::hashes_match(&key.key_hash, &hash)))
    }

    async fn add(&self, key: ApiKey) -> Result<(), KeyStoreError> {
        let permissions_json = serde_json::to_string(&key.permissions)
            .map_err(|e| KeyStoreError::Storage(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO api_keys (id, key_hash, plugin_id, name, permissions, created_at, expires_at, active) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&key.id)
        .bind(&key.key_hash)
        .bind(&key.plugin_id)
        .bind(&key.name)
        .bind(&permissions_json)
        .bind(key.created_at.to_rfc3339())
        .bind(key.expires_at.map(|dt| dt.to_rfc3339()))
        .bind(key.active as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(KeyStoreError::Duplicate(key.id))
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn update(&self, key: ApiKey) -> Result<(), KeyStoreError> {
        let permissions_json = serde_json::to_string(&key.permissions)
            .map_err(|e| KeyStoreError::Storage(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE api_keys SET key_hash = ?, plugin_id = ?, name = ?, permissions = ?, \
             expires_at = ?, active = ? WHERE id = ?",
        )
        .bind(&key.key_hash)
        .bind(&key.plugin_id)
        .bind(&key.name)
        .bind(&permissions_json)
        .bind(key.expires_at.map(|dt| dt.to_rfc3339()))
        .bind(key.active as i64)
        .bind(&key.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(KeyStoreError::NotFound(key.id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), KeyStoreError> {
        let result = sqlx::query("UPDATE api_keys SET active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(KeyStoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_by_plugin(&self, plugin_id: &str) -> Result<Vec<ApiKey>, KeyStoreError> {
        let rows = sqlx::query("SELECT * FROM api_keys WHERE plugin_id = ?")
            .bind(plugin_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_key).collect()
    }

    async fn health_check(&self) -> Result<(), KeyStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), KeyStoreError> {
        self.pool.close().await;
        Ok(())
    }
}
