// SPDX-License-Identifier: MIT OR Apache-2.0
//! API key persistence for the correlator's authentication middleware.
//!
//! Follows the repository pattern used across this codebase: a `*Store`
//! trait ([`KeyStore`]) defines the interface, and concrete `*Repository`-
//! style structs ([`InMemoryKeyStore`], [`SqlxKeyStore`]) implement it
//! against a specific backing technology. Callers depend only on the trait.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod memory;
mod sqlx_store;
mod store;

pub use error::KeyStoreError;
pub use key::{hash_key, hashes_match, mask_key, parse_api_key, ApiKey, ApiKeyFormatError, KEY_PREFIX, KEY_TOTAL_LEN};
pub use memory::InMemoryKeyStore;
pub use sqlx_store::SqlxKeyStore;
pub use store::KeyStore;
