//! The `ApiKey` entity: token format, hashing for at-rest storage, and
//! masking for logs.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use subtle::ConstantTimeEq;

/// Prefix every well-formed token carries.
pub const KEY_PREFIX: &str = "correlator_ak_";
/// Total length of a well-formed token: the 14-byte prefix plus 64 hex chars.
pub const KEY_TOTAL_LEN: usize = 78;

/// A persisted API key, identifying a plugin allowed to write events.
///
/// The raw token is never stored: [`Self::key_hash`] holds its SHA-256 hex
/// digest, so persistence never holds a plaintext secret at rest and lookup
/// runs in time independent of whether the key exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    /// Opaque, unique identifier of this key (distinct from the token itself).
    pub id: String,
    /// SHA-256 hex digest of the raw token.
    pub key_hash: String,
    /// Identity of the plugin this key authenticates.
    pub plugin_id: String,
    /// Human-readable label for this key.
    pub name: String,
    /// Scopes granted to this key, e.g. `lineage:write`, `lineage:read`.
    pub permissions: BTreeSet<String>,
    /// When this key was created.
    pub created_at: DateTime<Utc>,
    /// When this key stops being valid, if ever.
    pub expires_at: Option<DateTime<Utc>>,
    /// `false` marks a soft-deleted key. Never physically deleted while
    /// referenced by audit logs.
    pub active: bool,
}

impl ApiKey {
    /// Whether this key may currently authenticate a request: active and,
    /// if it has an expiry, not yet past it.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_none_or(|exp| exp > now)
    }
}

/// Reasons a candidate token fails format validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApiKeyFormatError {
    /// The token did not begin with [`KEY_PREFIX`].
    #[error("API key has the wrong prefix")]
    WrongPrefix,
    /// The token was not exactly [`KEY_TOTAL_LEN`] characters.
    #[error("API key has the wrong length")]
    WrongLength,
    /// The suffix after the prefix was not lower-case hex.
    #[error("API key suffix is not hex")]
    NotHex,
}

/// Validates a candidate token's shape before any store lookup: the
/// `correlator_ak_` prefix, a 78-character total length, and a hex suffix.
/// Does not check existence — that is the store's job.
pub fn parse_api_key(token: &str) -> Result<(), ApiKeyFormatError> {
    if token.len() != KEY_TOTAL_LEN {
        return Err(ApiKeyFormatError::WrongLength);
    }
    let Some(suffix) = token.strip_prefix(KEY_PREFIX) else {
        return Err(ApiKeyFormatError::WrongPrefix);
    };
    if !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ApiKeyFormatError::NotHex);
    }
    Ok(())
}

/// Computes the SHA-256 hex digest used as the at-rest and lookup key for a
/// raw token. Lookup by digest means a present vs. absent key take the same
/// path through the store, closing the timing side-channel on existence.
pub fn hash_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares two hash digests in constant time. Used to re-verify a row
/// fetched by a keyed lookup (`HashMap` key equality or a SQL `WHERE`
/// clause) rather than trusting the backing index's own equality check,
/// which is not a security property either implementation promises.
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Masks a token for safe inclusion in logs: prefix plus the first and last
/// four hex characters, e.g. `correlator_ak_ab12...ef90`.
pub fn mask_key(token: &str) -> String {
    match token.strip_prefix(KEY_PREFIX) {
        Some(suffix) if suffix.len() >= 8 => {
            format!(
                "{KEY_PREFIX}{}...{}",
                &suffix[..4],
                &suffix[suffix.len() - 4..]
            )
        }
        _ => "***".to_string(),
    }
}
