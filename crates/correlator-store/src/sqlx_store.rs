//! `SqlitePool`-backed `LineageStore`, standing in for the real
//! migrator-prepared relational store so the crate is self-contained and
//! testable without an external Postgres instance.

use crate::result::{BatchResult, EventOutcome};
use crate::store::{LineageStore, StoreCounts};
use crate::{IngestEvent, StoreError};
use async_trait::async_trait;
use sqlx::SqlitePool;

const CREATE_TABLES_SQL: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS job_runs (
        canonical_job_run_id TEXT PRIMARY KEY,
        namespace TEXT NOT NULL,
        name TEXT NOT NULL,
        producer TEXT NOT NULL,
        first_event_time TEXT NOT NULL,
        last_event_time TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS datasets (
        urn TEXT PRIMARY KEY,
        namespace TEXT NOT NULL,
        name TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS lineage_events (
        idempotency_key TEXT PRIMARY KEY,
        canonical_job_run_id TEXT NOT NULL,
        event_time TEXT NOT NULL,
        event_type TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS lineage_edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        input_urn TEXT,
        canonical_job_run_id TEXT NOT NULL,
        output_urn TEXT,
        event_time TEXT NOT NULL
    )"#,
];

/// `LineageStore` implementation backed by a `sqlx::SqlitePool`.
///
/// Schema creation for production deployments is the separate migrator's
/// job; [`Self::ensure_schema`] exists so this crate can stand alone in
/// tests and single-binary deployments.
pub struct SqlxLineageStore {
    pool: SqlitePool,
}

impl SqlxLineageStore {
    /// Wraps an already-connected pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the lineage tables if they do not already exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in CREATE_TABLES_SQL {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn ingest_one(&self, event: &IngestEvent) -> EventOutcome {
        match self.try_ingest_one(event).await {
            Ok(outcome) => outcome,
            Err(err) => classify_failure(err),
        }
    }

    async fn try_ingest_one(&self, event: &IngestEvent) -> Result<EventOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM lineage_events WHERE idempotency_key = ?",
        )
        .bind(&event.idempotency_key)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            tx.commit().await?;
            return Ok(EventOutcome::Duplicate);
        }

        sqlx::query(
            "INSERT INTO job_runs (canonical_job_run_id, namespace, name, producer, first_event_time, last_event_time) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(canonical_job_run_id) DO UPDATE SET \
                producer = excluded.producer, \
                first_event_time = MIN(job_runs.first_event_time, excluded.first_event_time), \
                last_event_time = MAX(job_runs.last_event_time, excluded.last_event_time)",
        )
        .bind(&event.canonical_job_run_id)
        .bind(&event.namespace)
        .bind(&event.job_name)
        .bind(&event.producer)
        .bind(event.event_time.to_rfc3339())
        .bind(event.event_time.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for dataset in event.inputs.iter().chain(event.outputs.iter()) {
            sqlx::query(
                "INSERT INTO datasets (urn, namespace, name) VALUES (?, ?, ?) \
                 ON CONFLICT(urn) DO NOTHING",
            )
            .bind(&dataset.urn)
            .bind(&dataset.namespace)
            .bind(&dataset.name)
            .execute(&mut *tx)
            .await?;
        }

        let insert_result = sqlx::query(
            "INSERT INTO lineage_events (idempotency_key, canonical_job_run_id, event_time, event_type) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&event.idempotency_key)
        .bind(&event.canonical_job_run_id)
        .bind(event.event_time.to_rfc3339())
        .bind(event.event_type.as_str())
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &insert_result {
            if db_err.is_unique_violation() {
                tx.rollback().await?;
                return Ok(EventOutcome::Duplicate);
            }
        }
        insert_result?;

        insert_edges(&mut tx, event).await?;

        tx.commit().await?;
        Ok(EventOutcome::Stored)
    }
}

async fn insert_edges(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    event: &IngestEvent,
) -> Result<(), sqlx::Error> {
    let pairs: Vec<(Option<&str>, Option<&str>)> = match (event.inputs.is_empty(), event.outputs.is_empty()) {
        (false, false) => event
            .inputs
            .iter()
            .flat_map(|input| event.outputs.iter().map(move |output| (Some(input.urn.as_str()), Some(output.urn.as_str()))))
            .collect(),
        (false, true) => event.inputs.iter().map(|input| (Some(input.urn.as_str()), None)).collect(),
        (true, false) => event.outputs.iter().map(|output| (None, Some(output.urn.as_str()))).collect(),
        (true, true) => Vec::new(),
    };

    for (input_urn, output_urn) in pairs {
        sqlx::query(
            "INSERT INTO lineage_edges (input_urn, canonical_job_run_id, output_urn, event_time) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(input_urn)
        .bind(&event.canonical_job_run_id)
        .bind(output_urn)
        .bind(event.event_time.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Classifies an ingestion-transaction failure as retriable or not, per
/// §4.5/§7: connection loss, deadlock, and timeouts are transient;
/// anything else (a decode failure, a constraint we didn't anticipate) is
/// treated as non-retriable rather than risking an infinite retry loop.
fn classify_failure(err: sqlx::Error) -> EventOutcome {
    let retriable = matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    ) || matches!(&err, sqlx::Error::Database(db_err) if is_transient_db_error(db_err.as_ref()));

    if retriable {
        EventOutcome::FailedRetriable { reason: err.to_string() }
    } else {
        EventOutcome::FailedNonRetriable { reason: err.to_string() }
    }
}

fn is_transient_db_error(db_err: &dyn sqlx::error::DatabaseError) -> bool {
    let message = db_err.message().to_ascii_lowercase();
    message.contains("locked") || message.contains("busy") || message.contains("timeout")
}

#[async_trait]
impl LineageStore for SqlxLineageStore {
    async fn ingest_batch(&self, events: Vec<IngestEvent>) -> BatchResult {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in &events {
            outcomes.push(self.ingest_one(event).await);
        }
        BatchResult::new(outcomes)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let job_runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_runs")
            .fetch_one(&self.pool)
            .await?;
        let datasets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM datasets")
            .fetch_one(&self.pool)
            .await?;
        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lineage_events")
            .fetch_one(&self.pool)
            .await?;
        let edges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lineage_edges")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreCounts {
            job_runs: job_runs as usize,
            datasets: datasets as usize,
            events: events as usize,
            edges: edges as usize,
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
