//! The `LineageStore` interface shared by the in-memory and persistent
//! implementations.

use crate::{BatchResult, IngestEvent, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Row counts used by the `/api/v1/health/data-consistency` diagnostic
/// endpoint. Not a correctness contract — an operator-facing snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    /// Distinct canonical job-run IDs observed.
    pub job_runs: usize,
    /// Distinct dataset URNs observed.
    pub datasets: usize,
    /// Distinct idempotency keys persisted (one per unique event).
    pub events: usize,
    /// Lineage edges persisted.
    pub edges: usize,
}

/// Persists ingested lineage events idempotently and builds the
/// cross-tool graph of job runs, datasets, and the edges between them.
///
/// Both implementations in this crate ([`crate::InMemoryLineageStore`] and
/// [`crate::SqlxLineageStore`]) share these observable semantics:
/// `ingest_batch` never aborts a batch because one event failed; a
/// duplicate idempotency key is reported as [`crate::EventOutcome::Duplicate`]
/// rather than an error; events sharing a `canonical_job_run_id` commit in
/// input order relative to each other, while events for different job runs
/// may be processed concurrently.
#[async_trait]
pub trait LineageStore: Send + Sync {
    /// Ingests a batch of 1..N already-validated, already-canonicalized
    /// events. Returns one outcome per event, in input order.
    async fn ingest_batch(&self, events: Vec<IngestEvent>) -> BatchResult;

    /// Returns row counts for the data-consistency diagnostic endpoint.
    async fn counts(&self) -> Result<StoreCounts, StoreError>;

    /// Probes the backing store's reachability within the caller's deadline.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Releases any held connections. A no-op for the in-memory store.
    async fn close(&self) -> Result<(), StoreError>;
}
