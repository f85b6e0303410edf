//! Entities the lineage store persists: job runs, datasets, events, and the
//! edges between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The life-cycle transition an ingested event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// A job run has begun.
    Start,
    /// A job run is still in progress (heartbeat).
    Running,
    /// A job run finished successfully.
    Complete,
    /// A job run finished with a failure.
    Fail,
    /// A job run was aborted before completion.
    Abort,
    /// Any event type the producer emits that doesn't fit the above.
    Other,
}

impl EventType {
    /// Parses an OpenLineage `eventType` string. Case-sensitive per the
    /// wire contract: producers emit the fixed upper-case vocabulary.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "START" => Some(Self::Start),
            "RUNNING" => Some(Self::Running),
            "COMPLETE" => Some(Self::Complete),
            "FAIL" => Some(Self::Fail),
            "ABORT" => Some(Self::Abort),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }

    /// Renders back to the wire vocabulary.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Fail => "FAIL",
            Self::Abort => "ABORT",
            Self::Other => "OTHER",
        }
    }
}

/// A single execution of a job by some tool, identified cross-tool by
/// [`Self::canonical_job_run_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    /// `{tool}:{run_id}`, at most 255 characters. See `correlator_canonical`.
    pub canonical_job_run_id: String,
    /// Raw job namespace as reported by the producer.
    pub namespace: String,
    /// Job name as reported by the producer.
    pub name: String,
    /// The producer URL of the most recent event observed for this run.
    pub producer: String,
    /// Timestamp of the first event observed for this run.
    pub first_event_time: DateTime<Utc>,
    /// Timestamp of the most recent event observed for this run.
    pub last_event_time: DateTime<Utc>,
}

/// A logical data artifact referenced as a job run's input or output,
/// identified by [`Self::urn`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// `{normalized_namespace}/{name}`. See `correlator_canonical::generate_dataset_urn`.
    pub urn: String,
    /// Normalized namespace this dataset lives in.
    pub namespace: String,
    /// Dataset name, exactly as reported (not normalized).
    pub name: String,
}

/// A directed `input_dataset -> job_run -> output_dataset` relation,
/// ordered by `event_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    /// URN of the upstream dataset, or `None` when this job run produced
    /// `output_urn` with no declared input (a root of the graph).
    pub input_urn: Option<String>,
    /// Job run that consumed `input_urn` and produced `output_urn`.
    pub canonical_job_run_id: String,
    /// URN of the downstream dataset, or `None` when this job run consumed
    /// `input_urn` with no declared output (a sink of the graph).
    pub output_urn: Option<String>,
    /// Ordering key: the event that asserted this edge.
    pub event_time: DateTime<Utc>,
}

/// A dataset reference as it appears in an event's `inputs[]`/`outputs[]`,
/// already canonicalized to its URN by the ingest handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    /// The canonical URN, per `correlator_canonical::generate_dataset_urn`.
    pub urn: String,
    /// Normalized namespace component.
    pub namespace: String,
    /// Name component, exactly as reported.
    pub name: String,
}

/// One event ready for ingestion: already validated and canonicalized by
/// the ingest handler (§4.1 identities computed, required fields checked).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestEvent {
    /// SHA-256 hex digest over the six-tuple; the dedup key.
    pub idempotency_key: String,
    /// `{tool}:{run_id}`, this event's job run identity.
    pub canonical_job_run_id: String,
    /// Raw job namespace, as reported.
    pub namespace: String,
    /// Job name, as reported.
    pub job_name: String,
    /// Producer URL, as reported. Not format-validated (post-MVP).
    pub producer: String,
    /// Raw `run.runId`, as reported.
    pub run_id: String,
    /// Event timestamp with nanosecond precision.
    pub event_time: DateTime<Utc>,
    /// Life-cycle transition this event describes.
    pub event_type: EventType,
    /// Canonicalized input datasets.
    pub inputs: Vec<DatasetRef>,
    /// Canonicalized output datasets.
    pub outputs: Vec<DatasetRef>,
}
