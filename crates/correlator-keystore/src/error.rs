//! Error taxonomy for key-store operations.

/// Failures a [`crate::KeyStore`] implementation can return.
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// `add` was called with an `id` or `key_hash` already present.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    /// `update`/`delete` referenced an `id` that does not exist.
    #[error("key not found: {0}")]
    NotFound(String),
    /// The backing store rejected the write or the row did not decode.
    #[error("key store storage error: {0}")]
    Storage(String),
    /// The backing store is unreachable within the caller's deadline.
    #[error("key store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for KeyStoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}
