// SPDX-License-Identifier: MIT OR Apache-2.0
//! Idempotent lineage persistence for the correlator: job-run and dataset
//! upserts, deduplicated event ingestion, and the lineage edges that tie a
//! downstream test failure back to the upstream job run that caused it.
//!
//! Follows the repository pattern used across this codebase: a `*Store`
//! trait ([`LineageStore`]) defines the interface, and concrete `*Repository`-
//! style structs ([`InMemoryLineageStore`], [`SqlxLineageStore`]) implement
//! it against a specific backing technology. Callers depend only on the
//! trait.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod model;
mod result;
mod sqlx_store;
mod store;

pub use error::StoreError;
pub use memory::InMemoryLineageStore;
pub use model::{Dataset, DatasetRef, EventType, IngestEvent, JobRun, LineageEdge};
pub use result::{BatchResult, BatchSummary, EventOutcome};
pub use sqlx_store::SqlxLineageStore;
pub use store::{LineageStore, StoreCounts};
