//! Per-event outcomes and the aggregate batch result returned by
//! [`crate::LineageStore::ingest_batch`].

use serde::{Deserialize, Serialize};

/// The disposition of one event within an ingested batch.
///
/// A failure of one event never aborts the rest of the batch — each
/// outcome is independent and carries its own classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventOutcome {
    /// The event's idempotency key was new; it and its edges were persisted.
    Stored,
    /// The event's idempotency key already existed. Counted as successful,
    /// not as a duplicate error.
    Duplicate,
    /// A transient storage failure (connection lost, deadlock, timeout).
    /// Safe for the caller to retry the same batch.
    FailedRetriable {
        /// Human-readable reason, for the batch summary and logs.
        reason: String,
    },
    /// A validation failure (missing field, malformed timestamp, bad URN).
    /// Retrying the same payload will fail identically.
    FailedNonRetriable {
        /// Human-readable reason, for the batch summary and logs.
        reason: String,
    },
}

impl EventOutcome {
    /// Whether this outcome counts toward `summary.successful`.
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Stored | Self::Duplicate)
    }

    /// Whether this outcome counts toward `summary.retriable`.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::FailedRetriable { .. })
    }

    /// The human-readable reason, if this outcome is a failure.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::FailedRetriable { reason } | Self::FailedNonRetriable { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Summary counts for one batch, matching the wire response's `summary`
/// object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total events in the batch.
    pub received: usize,
    /// `stored` + `duplicate` outcomes.
    pub successful: usize,
    /// `failed_retriable` + `failed_nonretriable` outcomes.
    pub failed: usize,
    /// `failed_retriable` outcomes only.
    pub retriable: usize,
    /// `failed_nonretriable` outcomes only.
    pub non_retriable: usize,
}

/// The result of ingesting one batch: per-event outcomes in input order,
/// plus the derived summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Outcomes, in the same order the events were submitted.
    pub outcomes: Vec<EventOutcome>,
}

impl BatchResult {
    /// Builds a result from per-event outcomes in input order.
    pub fn new(outcomes: Vec<EventOutcome>) -> Self {
        Self { outcomes }
    }

    /// Derives the aggregate [`BatchSummary`] from the per-event outcomes.
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            received: self.outcomes.len(),
            ..Default::default()
        };
        for outcome in &self.outcomes {
            if outcome.is_successful() {
                summary.successful += 1;
            } else {
                summary.failed += 1;
                if outcome.is_retriable() {
                    summary.retriable += 1;
                } else {
                    summary.non_retriable += 1;
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_successful_and_failed() {
        let result = BatchResult::new(vec![
            EventOutcome::Stored,
            EventOutcome::Duplicate,
            EventOutcome::FailedNonRetriable { reason: "bad".into() },
            EventOutcome::FailedRetriable { reason: "timeout".into() },
        ]);
        let summary = result.summary();
        assert_eq!(summary.received, 4);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.retriable, 1);
        assert_eq!(summary.non_retriable, 1);
    }

    #[test]
    fn all_success_summary_has_zero_failed() {
        let result = BatchResult::new(vec![EventOutcome::Stored, EventOutcome::Stored]);
        let summary = result.summary();
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.successful, 2);
    }
}
