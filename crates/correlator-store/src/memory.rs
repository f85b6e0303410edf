//! In-memory `LineageStore`, used in tests and the degraded
//! no-store-configured mode.

use crate::model::{Dataset, JobRun, LineageEdge};
use crate::result::{BatchResult, EventOutcome};
use crate::store::{LineageStore, StoreCounts};
use crate::{IngestEvent, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// An in-process `LineageStore`. Events are ingested strictly sequentially
/// within a batch — a strictly stronger guarantee than the contract
/// requires (same-job-run events commit in order; this store happens to
/// commit *all* events in order), chosen because it needs no extra
/// concurrency primitives for a store that already holds everything in one
/// process's memory.
#[derive(Default)]
pub struct InMemoryLineageStore {
    job_runs: RwLock<HashMap<String, JobRun>>,
    datasets: RwLock<HashMap<String, Dataset>>,
    seen_keys: RwLock<HashSet<String>>,
    edges: RwLock<Vec<LineageEdge>>,
}

impl InMemoryLineageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn ingest_one(&self, event: IngestEvent) -> EventOutcome {
        if self.seen_keys.read().await.contains(&event.idempotency_key) {
            return EventOutcome::Duplicate;
        }

        self.upsert_job_run(&event).await;
        for dataset in event.inputs.iter().chain(event.outputs.iter()) {
            self.upsert_dataset(dataset).await;
        }

        {
            let mut seen = self.seen_keys.write().await;
            if !seen.insert(event.idempotency_key.clone()) {
                // Lost a race with an identical concurrent call between the
                // read-lock check above and this write.
                return EventOutcome::Duplicate;
            }
        }

        self.insert_edges(&event).await;
        EventOutcome::Stored
    }

    async fn upsert_job_run(&self, event: &IngestEvent) {
        let mut job_runs = self.job_runs.write().await;
        job_runs
            .entry(event.canonical_job_run_id.clone())
            .and_modify(|run| {
                run.producer = event.producer.clone();
                run.first_event_time = run.first_event_time.min(event.event_time);
                run.last_event_time = run.last_event_time.max(event.event_time);
            })
            .or_insert_with(|| JobRun {
                canonical_job_run_id: event.canonical_job_run_id.clone(),
                namespace: event.namespace.clone(),
                name: event.job_name.clone(),
                producer: event.producer.clone(),
                first_event_time: event.event_time,
                last_event_time: event.event_time,
            });
    }

    async fn upsert_dataset(&self, dataset: &crate::model::DatasetRef) {
        let mut datasets = self.datasets.write().await;
        datasets.entry(dataset.urn.clone()).or_insert_with(|| Dataset {
            urn: dataset.urn.clone(),
            namespace: dataset.namespace.clone(),
            name: dataset.name.clone(),
        });
    }

    async fn insert_edges(&self, event: &IngestEvent) {
        if event.inputs.is_empty() && event.outputs.is_empty() {
            return;
        }

        let mut edges = self.edges.write().await;
        let push = |edges: &mut Vec<LineageEdge>, input: Option<String>, output: Option<String>| {
            edges.push(LineageEdge {
                input_urn: input,
                canonical_job_run_id: event.canonical_job_run_id.clone(),
                output_urn: output,
                event_time: event.event_time,
            });
        };

        match (event.inputs.is_empty(), event.outputs.is_empty()) {
            (false, false) => {
                for input in &event.inputs {
                    for output in &event.outputs {
                        push(&mut edges, Some(input.urn.clone()), Some(output.urn.clone()));
                    }
                }
            }
            (false, true) => {
                for input in &event.inputs {
                    push(&mut edges, Some(input.urn.clone()), None);
                }
            }
            (true, false) => {
                for output in &event.outputs {
                    push(&mut edges, None, Some(output.urn.clone()));
                }
            }
            (true, true) => unreachable!("guarded above"),
        }
    }
}

#[async_trait]
impl LineageStore for InMemoryLineageStore {
    async fn ingest_batch(&self, events: Vec<IngestEvent>) -> BatchResult {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.ingest_one(event).await);
        }
        BatchResult::new(outcomes)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        Ok(StoreCounts {
            job_runs: self.job_runs.read().await.len(),
            datasets: self.datasets.read().await.len(),
            events: self.seen_keys.read().await.len(),
            edges: self.edges.read().await.len(),
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
