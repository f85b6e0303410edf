//! `POST /api/v1/lineage/events`: parses an OpenLineage batch payload,
//! computes canonical identities for each event, delegates storage to
//! [`correlator_store::LineageStore`], and renders the batch summary.

use crate::correlation::CorrelationId;
use crate::problem::problem_response;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use correlator_error::ErrorCode;
use correlator_store::{BatchSummary, DatasetRef, EventOutcome, EventType, IngestEvent, LineageStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Request-body cap, per §4.6: oversize requests are rejected with 413
/// before any JSON parsing is attempted.
pub const MAX_REQUEST_SIZE_BYTES: usize = 1024 * 1024;

/// State the ingest handler needs.
#[derive(Clone)]
pub struct IngestState {
    /// Backing lineage store.
    pub store: Arc<dyn LineageStore>,
    /// Operator-supplied namespace aliases from `CORRELATOR_CONFIG_PATH`,
    /// layered on top of the canonicalizer's built-in scheme table. Empty
    /// when no overlay file was configured.
    pub namespace_aliases: Arc<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "eventTime")]
    event_time: String,
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(default)]
    producer: String,
    run: RawRun,
    job: RawJob,
    #[serde(default)]
    inputs: Vec<RawDataset>,
    #[serde(default)]
    outputs: Vec<RawDataset>,
}

#[derive(Debug, Deserialize)]
struct RawRun {
    #[serde(rename = "runId", default)]
    run_id: String,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    namespace: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct FailedEventEntry {
    index: usize,
    reason: String,
    retriable: bool,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    status: &'static str,
    summary: BatchSummary,
    failed_events: Vec<FailedEventEntry>,
    correlation_id: String,
    timestamp: String,
}

/// Axum handler for `POST /api/v1/lineage/events`.
pub async fn ingest_events(State(state): State<IngestState>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();

    let content_type_ok = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !content_type_ok {
        return problem_response(ErrorCode::UnsupportedContentType.problem(path, correlation_id));
    }

    let body: Body = req.into_body();
    let bytes = match to_bytes(body, MAX_REQUEST_SIZE_BYTES + 1).await {
        Ok(bytes) if bytes.len() > MAX_REQUEST_SIZE_BYTES => {
            return problem_response(ErrorCode::PayloadTooLarge.problem(path, correlation_id));
        }
        Ok(bytes) => bytes,
        // `to_bytes` only errors here on exceeding the limit or a body read
        // fault; either way the client's retry path is the same as 413.
        Err(_) => return problem_response(ErrorCode::PayloadTooLarge.problem(path, correlation_id)),
    };

    let raw_events = match parse_events(&bytes) {
        Ok(events) => events,
        Err(_) => return problem_response(ErrorCode::MalformedJson.problem(path, correlation_id)),
    };

    let (to_store, mut outcomes) = partition(raw_events, &state.namespace_aliases);
    let stored_outcomes = state.store.ingest_batch(to_store.iter().map(|(_, e)| e.clone()).collect()).await;

    for ((original_index, _), outcome) in to_store.into_iter().zip(stored_outcomes.outcomes) {
        outcomes[original_index] = Some(outcome);
    }

    let outcomes: Vec<EventOutcome> = outcomes.into_iter().map(|o| o.expect("every index filled")).collect();
    render_response(outcomes, correlation_id)
}

fn parse_events(bytes: &[u8]) -> Result<Vec<RawEvent>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    match value {
        serde_json::Value::Array(_) => serde_json::from_value(value),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

/// Splits raw events into those that passed validation (paired with their
/// original index and canonicalized [`IngestEvent`]) and a parallel
/// same-length outcome slots vector, pre-filled with `FailedNonRetriable`
/// for invalid events and `None` (to be filled after storage) for valid ones.
fn partition(
    raw_events: Vec<RawEvent>,
    aliases: &BTreeMap<String, String>,
) -> (Vec<(usize, IngestEvent)>, Vec<Option<EventOutcome>>) {
    let mut to_store = Vec::new();
    let mut outcomes = Vec::with_capacity(raw_events.len());

    for (index, raw) in raw_events.into_iter().enumerate() {
        match validate_and_canonicalize(raw, aliases) {
            Ok(event) => {
                to_store.push((index, event));
                outcomes.push(None);
            }
            Err(reason) => {
                outcomes.push(Some(EventOutcome::FailedNonRetriable { reason }));
            }
        }
    }

    (to_store, outcomes)
}

fn validate_and_canonicalize(raw: RawEvent, aliases: &BTreeMap<String, String>) -> Result<IngestEvent, String> {
    if raw.job.namespace.is_empty() {
        return Err("job.namespace must not be empty".to_string());
    }
    if raw.job.name.is_empty() {
        return Err("job.name must not be empty".to_string());
    }
    if raw.run.run_id.is_empty() {
        return Err("run.runId must not be empty".to_string());
    }
    let event_type = EventType::parse(&raw.event_type).ok_or_else(|| "invalid eventType".to_string())?;
    let event_time = parse_nanosecond_timestamp(&raw.event_time)
        .map_err(|_| "eventTime must be RFC 3339 with nanosecond precision".to_string())?;

    let event_time_str = event_time.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let canonical_job_run_id = correlator_canonical::generate_job_run_id(&raw.job.namespace, &raw.run.run_id);
    let idempotency_key = correlator_canonical::generate_idempotency_key(
        &raw.producer,
        &raw.job.namespace,
        &raw.job.name,
        &raw.run.run_id,
        &event_time_str,
        event_type.as_str(),
    );

    let inputs = raw.inputs.into_iter().map(|d| canonicalize_dataset(d, aliases)).collect();
    let outputs = raw.outputs.into_iter().map(|d| canonicalize_dataset(d, aliases)).collect();

    Ok(IngestEvent {
        idempotency_key,
        canonical_job_run_id,
        namespace: raw.job.namespace,
        job_name: raw.job.name,
        producer: raw.producer,
        run_id: raw.run.run_id,
        event_time,
        event_type,
        inputs,
        outputs,
    })
}

fn canonicalize_dataset(raw: RawDataset, aliases: &BTreeMap<String, String>) -> DatasetRef {
    let urn = correlator_canonical::generate_dataset_urn_with_aliases(&raw.namespace, &raw.name, aliases);
    DatasetRef {
        urn,
        namespace: correlator_canonical::normalize_namespace_with_aliases(&raw.namespace, aliases),
        name: raw.name,
    }
}

fn parse_nanosecond_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

fn render_response(outcomes: Vec<EventOutcome>, correlation_id: String) -> Response {
    let failed_events: Vec<FailedEventEntry> = outcomes
        .iter()
        .enumerate()
        .filter_map(|(index, outcome)| match outcome {
            EventOutcome::FailedRetriable { reason } => Some(FailedEventEntry {
                index,
                reason: reason.clone(),
                retriable: true,
            }),
            EventOutcome::FailedNonRetriable { reason } => Some(FailedEventEntry {
                index,
                reason: reason.clone(),
                retriable: false,
            }),
            _ => None,
        })
        .collect();

    let summary = correlator_store::BatchResult::new(outcomes).summary();
    let status = if summary.failed == 0 { "success" } else { "error" };
    let http_status = if summary.failed == 0 {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::from_u16(207).unwrap_or(axum::http::StatusCode::OK)
    };

    let body = IngestResponse {
        status,
        summary,
        failed_events,
        correlation_id,
        timestamp: Utc::now().to_rfc3339(),
    };

    (http_status, Json(body)).into_response()
}
