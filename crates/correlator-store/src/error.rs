//! Error taxonomy for lineage-store operations.

/// Failures a [`crate::LineageStore`] implementation can return at the
/// request level (as opposed to per-event outcomes, which are reported in
/// [`crate::BatchResult`] instead of as errors).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store rejected a write or a row did not decode.
    #[error("lineage store storage error: {0}")]
    Storage(String),
    /// The backing store is unreachable within the caller's deadline.
    #[error("lineage store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
