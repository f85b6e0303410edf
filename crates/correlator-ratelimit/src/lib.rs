// SPDX-License-Identifier: MIT OR Apache-2.0
//! Three-tier token-bucket rate limiting for the correlator's middleware
//! chain: a global tier, a lazily-created per-plugin tier, and a shared
//! unauthenticated tier, with a background idle-eviction sweep.
//!
//! The limiter is deliberately a narrow interface: the middleware chain
//! calls only [`RateLimiter::allow`]. A distributed implementation can
//! replace this crate at construction time with no change to callers.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod cleanup;
mod limiter;

pub use cleanup::{spawn_cleanup_task, CleanupHandle};
pub use limiter::RateLimiter;
