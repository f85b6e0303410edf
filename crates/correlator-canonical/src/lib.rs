// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic, side-effect-free canonicalization of the identities the
//! correlator uses to tie cross-tool lineage together: namespace
//! normalization, dataset URNs, canonical job-run IDs, and idempotency
//! keys. Every function here is a total function over strings — no I/O,
//! no clocks, no randomness.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Errors produced while parsing a previously-generated identity back apart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalError {
    /// A dataset URN had no namespace/name delimiter.
    #[error("dataset URN is missing a namespace/name delimiter: {0:?}")]
    MissingDelimiter(String),
    /// A dataset URN's namespace portion was empty.
    #[error("dataset URN has an empty namespace: {0:?}")]
    EmptyNamespace(String),
    /// A dataset URN's name portion was empty.
    #[error("dataset URN has an empty name: {0:?}")]
    EmptyName(String),
    /// A dataset URN's name portion was exactly `"/"`.
    #[error("dataset URN name consists only of '/': {0:?}")]
    NameIsSlashOnly(String),
}

// ---------------------------------------------------------------------------
// normalize_namespace
// ---------------------------------------------------------------------------

/// Scheme rewrites applied before default-port elision.
const SCHEME_REWRITES: &[(&str, &str)] = &[("postgres", "postgresql"), ("s3a", "s3"), ("s3n", "s3")];

/// Default port for schemes that have one, elided when present verbatim.
fn default_port_for(scheme: &str) -> Option<&'static str> {
    match scheme {
        "postgresql" => Some("5432"),
        "mysql" => Some("3306"),
        "mongodb" => Some("27017"),
        "redis" => Some("6379"),
        _ => None,
    }
}

/// Rewrites a data-source namespace URI so that heterogeneous producers
/// referring to the same physical store collide onto one identity.
///
/// Strings without `"://"` (e.g. `"bigquery"`, `"kafka"`, `"snowflake"`)
/// pass through unchanged. Username, a masked password token, path, and
/// query parameters are preserved exactly as given — this function never
/// URL-encodes or decodes anything.
pub fn normalize_namespace(ns: &str) -> String {
    let Some(scheme_end) = ns.find("://") else {
        return ns.to_string();
    };
    let raw_scheme = &ns[..scheme_end];
    let rest = &ns[scheme_end + 3..];

    let lower_scheme = raw_scheme.to_ascii_lowercase();
    let scheme = SCHEME_REWRITES
        .iter()
        .find(|(from, _)| *from == lower_scheme)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or(lower_scheme);

    let rest = elide_default_port(&scheme, rest);

    format!("{scheme}://{rest}")
}

/// Strips the scheme's default port from the authority portion of `rest`,
/// if present verbatim. The authority is everything before the first `/`
/// or `?`; it may carry `user:pass@host:port`.
fn elide_default_port(scheme: &str, rest: &str) -> String {
    let Some(default_port) = default_port_for(scheme) else {
        return rest.to_string();
    };

    let boundary = rest
        .find(['/', '?'])
        .unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(boundary);

    let (userinfo, host_port) = match authority.rfind('@') {
        Some(at) => (&authority[..=at], &authority[at + 1..]),
        None => ("", authority),
    };

    let new_host_port = match host_port.rfind(':') {
        Some(colon) if &host_port[colon + 1..] == default_port => host_port[..colon].to_string(),
        _ => host_port.to_string(),
    };

    format!("{userinfo}{new_host_port}{tail}")
}

/// Like [`normalize_namespace`], but first rewrites the namespace's scheme
/// prefix (or the whole string, for schemeless namespaces such as
/// `"bigquery"`) through an operator-supplied alias table before applying
/// the built-in scheme rewrites and default-port elision.
///
/// `aliases` comes from `correlator_config::NamespaceAliasOverlay`, keyed by
/// lower-cased alias prefix. An empty table is a no-op identical to
/// [`normalize_namespace`].
pub fn normalize_namespace_with_aliases(ns: &str, aliases: &BTreeMap<String, String>) -> String {
    if aliases.is_empty() {
        return normalize_namespace(ns);
    }

    match ns.find("://") {
        Some(scheme_end) => {
            let raw_scheme = &ns[..scheme_end];
            let rest = &ns[scheme_end..];
            match aliases.get(&raw_scheme.to_ascii_lowercase()) {
                Some(aliased) => normalize_namespace(&format!("{aliased}{rest}")),
                None => normalize_namespace(ns),
            }
        }
        None => match aliases.get(&ns.to_ascii_lowercase()) {
            Some(aliased) => normalize_namespace(aliased),
            None => normalize_namespace(ns),
        },
    }
}

// ---------------------------------------------------------------------------
// generate_dataset_urn / parse_dataset_urn
// ---------------------------------------------------------------------------

/// Builds the sole identity used for dataset nodes in the graph:
/// `{normalized_namespace}/{name}`.
///
/// Query-side code (lookups) MUST call this same function so storage and
/// lookup hash to the same URN.
pub fn generate_dataset_urn(namespace: &str, name: &str) -> String {
    format!("{}/{name}", normalize_namespace(namespace))
}

/// Like [`generate_dataset_urn`], but normalizes `namespace` through
/// [`normalize_namespace_with_aliases`] first. The ingest handler and any
/// read-path lookup must use the same `aliases` table, or storage and
/// lookup will hash to different URNs.
pub fn generate_dataset_urn_with_aliases(
    namespace: &str,
    name: &str,
    aliases: &BTreeMap<String, String>,
) -> String {
    format!("{}/{name}", normalize_namespace_with_aliases(namespace, aliases))
}

/// Splits a dataset URN produced by [`generate_dataset_urn`] back into
/// `(namespace, name)`.
///
/// When the URN contains `"://"`, the delimiter is the *first* `/` after
/// the `"://"`; otherwise it is the first `/` in the whole string.
pub fn parse_dataset_urn(urn: &str) -> Result<(String, String), CanonicalError> {
    let search_from = urn.find("://").map(|i| i + 3).unwrap_or(0);

    let delimiter = urn[search_from..]
        .find('/')
        .map(|i| search_from + i)
        .ok_or_else(|| CanonicalError::MissingDelimiter(urn.to_string()))?;

    let namespace = &urn[..delimiter];
    let name = &urn[delimiter + 1..];

    if namespace.is_empty() {
        return Err(CanonicalError::EmptyNamespace(urn.to_string()));
    }
    if name.is_empty() {
        return Err(CanonicalError::EmptyName(urn.to_string()));
    }
    if name == "/" {
        return Err(CanonicalError::NameIsSlashOnly(urn.to_string()));
    }

    Ok((namespace.to_string(), name.to_string()))
}

// ---------------------------------------------------------------------------
// extract_table_name
// ---------------------------------------------------------------------------

/// Known file extensions stripped before taking the final dotted segment.
const KNOWN_EXTENSIONS: &[&str] = &[".parquet", ".csv", ".json", ".avro", ".orc"];

/// Best-effort extraction of a human-recognizable table name from a dataset
/// URN. Used only by orphan-dataset matching — never as an identity.
pub fn extract_table_name(urn: &str) -> String {
    let without_scheme = match urn.find("://") {
        Some(i) => &urn[i + 3..],
        None => urn,
    };

    let last_segment = without_scheme.rsplit('/').next().unwrap_or(without_scheme);

    let mut stripped = last_segment;
    for ext in KNOWN_EXTENSIONS {
        if let Some(s) = stripped.strip_suffix(ext) {
            stripped = s;
            break;
        }
    }

    let last_dotted = stripped.rsplit('.').next().unwrap_or(stripped);
    last_dotted.to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// generate_job_run_id / parse_canonical_job_run_id
// ---------------------------------------------------------------------------

/// Maximum length of a canonical job-run ID.
pub const MAX_JOB_RUN_ID_LEN: usize = 255;

/// The tool family a namespace prefix maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// `dbt` namespaces.
    Dbt,
    /// `airflow` namespaces.
    Airflow,
    /// `spark` namespaces.
    Spark,
    /// `great_expectations`, `ge`, or `gx` namespaces.
    GreatExpectations,
    /// Namespace had no scheme prefix at all.
    Unknown,
    /// Any other recognized-but-unmapped scheme.
    Custom,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dbt => "dbt",
            Self::Airflow => "airflow",
            Self::Spark => "spark",
            Self::GreatExpectations => "ge",
            Self::Unknown => "unknown",
            Self::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// Derives the [`Tool`] family from a namespace's prefix before `"://"`.
fn tool_from_namespace(namespace: &str) -> Tool {
    let prefix = match namespace.find("://") {
        Some(i) => &namespace[..i],
        None => return Tool::Unknown,
    };

    if prefix.is_empty() {
        return Tool::Unknown;
    }

    match prefix.to_ascii_lowercase().as_str() {
        "dbt" => Tool::Dbt,
        "airflow" => Tool::Airflow,
        "spark" => Tool::Spark,
        "great_expectations" | "ge" | "gx" => Tool::GreatExpectations,
        _ => Tool::Custom,
    }
}

/// Builds the cross-tool identity of one job execution:
/// `{tool}:{run_id}`, truncated to [`MAX_JOB_RUN_ID_LEN`] characters.
pub fn generate_job_run_id(namespace: &str, run_id: &str) -> String {
    let tool = tool_from_namespace(namespace);
    let full = format!("{tool}:{run_id}");
    truncate_chars(&full, MAX_JOB_RUN_ID_LEN)
}

/// Truncates `s` to at most `max_chars` Unicode scalar values (not bytes).
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Splits a canonical job-run ID produced by [`generate_job_run_id`] back
/// into `(tool, run_id)`, splitting on the *first* colon only so colons in
/// the run ID are preserved.
pub fn parse_canonical_job_run_id(id: &str) -> Option<(String, String)> {
    let colon = id.find(':')?;
    Some((id[..colon].to_string(), id[colon + 1..].to_string()))
}

// ---------------------------------------------------------------------------
// generate_idempotency_key
// ---------------------------------------------------------------------------

/// Computes the idempotency key for a `LineageEvent`: the lower-case hex
/// SHA-256 digest of `producer ∥ namespace ∥ job_name ∥ run_id ∥
/// event_time ∥ event_type`, concatenated in exactly that order.
///
/// `event_time` must be formatted with full nanosecond precision by the
/// caller (e.g. RFC 3339 with 9 fractional digits) — differing nanoseconds
/// must yield different keys so START and COMPLETE of the same run get
/// distinct keys. Differing `producer` values for otherwise identical
/// tuples must yield different keys, for multi-tenant safety.
pub fn generate_idempotency_key(
    producer: &str,
    namespace: &str,
    job_name: &str,
    run_id: &str,
    event_time: &str,
    event_type: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(producer.as_bytes());
    hasher.update(namespace.as_bytes());
    hasher.update(job_name.as_bytes());
    hasher.update(run_id.as_bytes());
    hasher.update(event_time.as_bytes());
    hasher.update(event_type.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -- normalize_namespace --------------------------------------------

    #[test]
    fn passthrough_without_scheme_delimiter() {
        assert_eq!(normalize_namespace("bigquery"), "bigquery");
        assert_eq!(normalize_namespace("kafka"), "kafka");
        assert_eq!(normalize_namespace("snowflake"), "snowflake");
    }

    #[test]
    fn rewrites_postgres_scheme() {
        assert_eq!(
            normalize_namespace("postgres://h:5432"),
            "postgresql://h"
        );
    }

    #[test]
    fn rewrites_s3_variants() {
        assert_eq!(normalize_namespace("s3a://bucket"), "s3://bucket");
        assert_eq!(normalize_namespace("s3n://bucket"), "s3://bucket");
    }

    #[test]
    fn lower_cases_scheme() {
        assert_eq!(
            normalize_namespace("POSTGRESQL://host"),
            "postgresql://host"
        );
    }

    #[test]
    fn elides_default_ports() {
        assert_eq!(normalize_namespace("postgresql://h:5432"), "postgresql://h");
        assert_eq!(normalize_namespace("mysql://h:3306"), "mysql://h");
        assert_eq!(normalize_namespace("mongodb://h:27017"), "mongodb://h");
        assert_eq!(normalize_namespace("redis://h:6379"), "redis://h");
    }

    #[test]
    fn preserves_non_default_ports() {
        assert_eq!(
            normalize_namespace("postgresql://h:5433"),
            "postgresql://h:5433"
        );
    }

    #[test]
    fn preserves_userinfo_path_and_query() {
        assert_eq!(
            normalize_namespace("postgresql://user:***@h:5432/db?sslmode=require"),
            "postgresql://user:***@h/db?sslmode=require"
        );
    }

    #[test]
    fn cross_tool_equivalence_postgres() {
        assert_eq!(
            normalize_namespace("postgres://h:5432"),
            normalize_namespace("postgresql://h")
        );
    }

    #[test]
    fn cross_tool_equivalence_s3() {
        assert_eq!(normalize_namespace("s3a://b"), normalize_namespace("s3://b"));
    }

    // -- normalize_namespace_with_aliases --------------------------------

    #[test]
    fn empty_alias_table_matches_plain_normalize() {
        let aliases = BTreeMap::new();
        assert_eq!(
            normalize_namespace_with_aliases("postgres://h:5432", &aliases),
            normalize_namespace("postgres://h:5432")
        );
    }

    #[test]
    fn alias_rewrites_scheme_before_built_in_table() {
        let mut aliases = BTreeMap::new();
        aliases.insert("postgres-replica".to_string(), "postgresql".to_string());
        assert_eq!(
            normalize_namespace_with_aliases("postgres-replica://h:5432", &aliases),
            "postgresql://h"
        );
    }

    #[test]
    fn alias_rewrites_schemeless_namespace() {
        let mut aliases = BTreeMap::new();
        aliases.insert("lakehouse".to_string(), "s3".to_string());
        assert_eq!(
            normalize_namespace_with_aliases("lakehouse", &aliases),
            "s3"
        );
    }

    #[test]
    fn unmatched_prefix_falls_through_to_built_in_normalize() {
        let mut aliases = BTreeMap::new();
        aliases.insert("lakehouse".to_string(), "s3".to_string());
        assert_eq!(
            normalize_namespace_with_aliases("postgres://h:5432", &aliases),
            normalize_namespace("postgres://h:5432")
        );
    }

    #[test]
    fn dataset_urn_with_aliases_uses_aliased_namespace() {
        let mut aliases = BTreeMap::new();
        aliases.insert("postgres-replica".to_string(), "postgresql".to_string());
        assert_eq!(
            generate_dataset_urn_with_aliases("postgres-replica://h:5432", "x", &aliases),
            generate_dataset_urn("postgresql://h", "x")
        );
    }

    // -- generate_dataset_urn / parse_dataset_urn -----------------------

    #[test]
    fn dataset_urn_scenario_from_spec() {
        assert_eq!(
            generate_dataset_urn("postgres://h:5432", "x"),
            generate_dataset_urn("postgresql://h", "x")
        );
        assert_eq!(
            generate_dataset_urn("s3a://b", "/k"),
            generate_dataset_urn("s3://b", "/k")
        );
    }

    #[test]
    fn parse_roundtrips_simple_urn() {
        let urn = generate_dataset_urn("postgresql://h", "schema.table");
        let (ns, name) = parse_dataset_urn(&urn).unwrap();
        assert_eq!(ns, "postgresql://h");
        assert_eq!(name, "schema.table");
    }

    #[test]
    fn parse_handles_root_path_name_with_leading_slash() {
        let urn = generate_dataset_urn("s3://bucket", "/key/path");
        assert_eq!(urn, "s3://bucket//key/path");
        let (ns, name) = parse_dataset_urn(&urn).unwrap();
        assert_eq!(ns, "s3://bucket");
        assert_eq!(name, "/key/path");
    }

    #[test]
    fn parse_without_scheme_uses_first_slash() {
        let (ns, name) = parse_dataset_urn("bigquery/dataset.table").unwrap();
        assert_eq!(ns, "bigquery");
        assert_eq!(name, "dataset.table");
    }

    #[test]
    fn parse_rejects_missing_delimiter() {
        assert_eq!(
            parse_dataset_urn("postgresql://host-with-no-name"),
            Err(CanonicalError::MissingDelimiter(
                "postgresql://host-with-no-name".to_string()
            ))
        );
    }

    #[test]
    fn parse_rejects_empty_name() {
        let err = parse_dataset_urn("postgresql://host/").unwrap_err();
        assert!(matches!(err, CanonicalError::EmptyName(_)));
    }

    #[test]
    fn parse_rejects_name_that_is_only_slash() {
        let err = parse_dataset_urn("postgresql://host//").unwrap_err();
        assert!(matches!(err, CanonicalError::NameIsSlashOnly(_)));
    }

    // -- extract_table_name ----------------------------------------------

    #[test]
    fn extract_table_name_strips_scheme_and_lowercases() {
        assert_eq!(
            extract_table_name("postgresql://host/Schema.Orders"),
            "orders"
        );
    }

    #[test]
    fn extract_table_name_strips_known_extension() {
        assert_eq!(
            extract_table_name("s3://bucket/path/to/Events.parquet"),
            "events"
        );
    }

    #[test]
    fn extract_table_name_without_extension_or_dot() {
        assert_eq!(extract_table_name("s3://bucket/path/readme"), "readme");
    }

    // -- generate_job_run_id / parse_canonical_job_run_id ----------------

    #[test]
    fn job_run_id_maps_known_tools() {
        assert_eq!(generate_job_run_id("dbt://analytics", "r1"), "dbt:r1");
        assert_eq!(
            generate_job_run_id("airflow://cluster", "r1"),
            "airflow:r1"
        );
        assert_eq!(generate_job_run_id("spark://cluster", "r1"), "spark:r1");
        assert_eq!(
            generate_job_run_id("great_expectations://suite", "r1"),
            "ge:r1"
        );
        assert_eq!(generate_job_run_id("ge://suite", "r1"), "ge:r1");
        assert_eq!(generate_job_run_id("gx://suite", "r1"), "ge:r1");
    }

    #[test]
    fn job_run_id_maps_unknown_and_custom() {
        assert_eq!(generate_job_run_id("no-scheme-here", "r1"), "unknown:r1");
        assert_eq!(
            generate_job_run_id("fivetran://conn", "r1"),
            "custom:r1"
        );
    }

    #[test]
    fn job_run_id_truncates_to_255() {
        let long_run_id = "x".repeat(400);
        let id = generate_job_run_id("dbt://analytics", &long_run_id);
        assert_eq!(id.chars().count(), MAX_JOB_RUN_ID_LEN);
    }

    #[test]
    fn job_run_id_roundtrips_preserving_colons_in_run_id() {
        let id = generate_job_run_id("dbt://analytics", "run:with:colons");
        let (tool, run_id) = parse_canonical_job_run_id(&id).unwrap();
        assert_eq!(tool, "dbt");
        assert_eq!(run_id, "run:with:colons");
    }

    // -- generate_idempotency_key -----------------------------------------

    #[test]
    fn idempotency_key_is_64_hex_chars() {
        let key = generate_idempotency_key(
            "producer",
            "ns",
            "job",
            "run1",
            "2025-10-22T10:00:00.000000000Z",
            "COMPLETE",
        );
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn idempotency_key_stable_for_identical_inputs() {
        let a = generate_idempotency_key("p", "n", "j", "r", "t", "e");
        let b = generate_idempotency_key("p", "n", "j", "r", "t", "e");
        assert_eq!(a, b);
    }

    #[test]
    fn idempotency_key_differs_on_event_time_nanoseconds() {
        let start = generate_idempotency_key(
            "p",
            "n",
            "j",
            "r",
            "2025-10-22T10:00:00.000000000Z",
            "START",
        );
        let complete = generate_idempotency_key(
            "p",
            "n",
            "j",
            "r",
            "2025-10-22T10:00:00.000000001Z",
            "COMPLETE",
        );
        assert_ne!(start, complete);
    }

    #[test]
    fn idempotency_key_differs_on_producer() {
        let a = generate_idempotency_key("tenant-a", "n", "j", "r", "t", "e");
        let b = generate_idempotency_key("tenant-b", "n", "j", "r", "t", "e");
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn idempotency_key_changes_when_any_field_changes(
            p1 in "[a-z]{1,8}", p2 in "[a-z]{1,8}",
            n in "[a-z]{1,8}", j in "[a-z]{1,8}",
            r in "[a-z]{1,8}", t in "[a-z]{1,8}", e in "[a-z]{1,8}",
        ) {
            prop_assume!(p1 != p2);
            let a = generate_idempotency_key(&p1, &n, &j, &r, &t, &e);
            let b = generate_idempotency_key(&p2, &n, &j, &r, &t, &e);
            prop_assert_ne!(a, b);
        }

        #[test]
        fn job_run_id_never_exceeds_max_len(
            ns in "[a-z]{0,12}(://[a-z]{0,12})?",
            run_id in ".{0,400}",
        ) {
            let id = generate_job_run_id(&ns, &run_id);
            prop_assert!(id.chars().count() <= MAX_JOB_RUN_ID_LEN);
        }

        #[test]
        fn dataset_urn_roundtrip_for_nonempty_names(
            ns in "[a-z]{1,10}(://[a-z0-9.]{1,12})?",
            name in "[a-z][a-z0-9._/]{0,20}",
        ) {
            prop_assume!(name != "/");
            let normalized = normalize_namespace(&ns);
            let urn = generate_dataset_urn(&ns, &name);
            let (parsed_ns, parsed_name) = parse_dataset_urn(&urn).unwrap();
            prop_assert_eq!(parsed_ns, normalized);
            prop_assert_eq!(parsed_name, name);
        }
    }
}
