// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime configuration for the correlator daemon: environment-variable
//! driven settings with typed defaults, plus an optional YAML overlay of
//! namespace-alias rules consumed by the canonicalizer at startup.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors & warnings
// ---------------------------------------------------------------------------

/// Errors that can occur while assembling [`CorrelatorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `CORRELATOR_CONFIG_PATH` named a file that does not exist.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },
    /// The overlay file existed but was not valid YAML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
    /// An environment variable held a value of the wrong shape for its field.
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages, one per offending variable.
        reasons: Vec<String>,
    },
}

/// Advisory-level issues surfaced during config loading that do not prevent
/// startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended file or variable is absent; a default was substituted.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A numeric setting is set unusually high and likely a misconfiguration.
    LargeValue {
        /// Name of the field.
        field: String,
        /// The value that triggered the warning.
        value: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            Self::LargeValue { field, value } => {
                write!(f, "field '{field}' has an unusually large value ({value})")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Env var parsing helpers
// ---------------------------------------------------------------------------

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(
    name: &str,
    default: T,
    errors: &mut Vec<String>,
) -> T {
    match std::env::var(name) {
        Err(_) => default,
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            errors.push(format!("{name}={raw:?} is not a valid value"));
            default
        }),
    }
}

fn env_bool(name: &str, default: bool, errors: &mut Vec<String>) -> bool {
    match std::env::var(name) {
        Err(_) => default,
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                errors.push(format!("{name}={raw:?} is not a valid boolean"));
                default
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Rate limiter config
// ---------------------------------------------------------------------------

/// Rate (requests/second) and burst allowance for one token-bucket tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitTierConfig {
    /// Steady-state requests/second.
    pub rate: u32,
    /// Maximum burst above the steady-state rate.
    pub burst: u32,
}

impl RateLimitTierConfig {
    fn from_env(rate_var: &str, burst_var: &str, default_rate: u32, errors: &mut Vec<String>) -> Self {
        let rate = env_parsed(rate_var, default_rate, errors);
        let default_burst = rate.saturating_mul(2);
        let burst = env_parsed(burst_var, default_burst, errors);
        Self { rate, burst }
    }
}

/// Full three-tier rate-limiter configuration plus the idle-eviction
/// schedule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimiterConfig {
    /// Tier applied to every authenticated request.
    pub global: RateLimitTierConfig,
    /// Tier with one bucket per plugin, created lazily.
    pub plugin: RateLimitTierConfig,
    /// Tier shared by all unauthenticated requests.
    pub unauthenticated: RateLimitTierConfig,
    /// How often the idle-eviction sweep runs.
    #[serde(with = "duration_secs")]
    pub cleanup_interval: Duration,
    /// How long a plugin bucket may sit idle before eviction.
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
    /// Advisory ceiling on live plugin buckets; crossing 80% logs a warning.
    pub max_plugins: usize,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl RateLimiterConfig {
    fn from_env(errors: &mut Vec<String>) -> Self {
        let global = RateLimitTierConfig::from_env(
            "CORRELATOR_GLOBAL_RPS",
            "CORRELATOR_GLOBAL_BURST",
            100,
            errors,
        );
        let plugin = RateLimitTierConfig::from_env(
            "CORRELATOR_PLUGIN_RPS",
            "CORRELATOR_PLUGIN_BURST",
            50,
            errors,
        );
        let unauthenticated = RateLimitTierConfig::from_env(
            "CORRELATOR_UNAUTH_RPS",
            "CORRELATOR_UNAUTH_BURST",
            10,
            errors,
        );
        let cleanup_interval = Duration::from_secs(env_parsed(
            "CORRELATOR_RATE_LIMIT_CLEANUP_INTERVAL",
            300,
            errors,
        ));
        let idle_timeout = Duration::from_secs(env_parsed(
            "CORRELATOR_RATE_LIMIT_IDLE_TIMEOUT",
            3600,
            errors,
        ));
        let max_plugins = env_parsed("CORRELATOR_RATE_LIMIT_MAX_PLUGINS", 10_000usize, errors);

        Self {
            global,
            plugin,
            unauthenticated,
            cleanup_interval,
            idle_timeout,
            max_plugins,
        }
    }
}

// ---------------------------------------------------------------------------
// Namespace alias overlay
// ---------------------------------------------------------------------------

/// Operator-supplied namespace rewrite rules, layered on top of the built-in
/// normalization scheme rewrites. Keys and values are raw namespace prefixes
/// (e.g. `"postgres-replica"` -> `"postgresql"`); applied before the
/// canonicalizer's own scheme table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NamespaceAliasOverlay {
    /// Map of alias namespace prefix to canonical namespace prefix.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl NamespaceAliasOverlay {
    /// Loads the overlay from `path`. A missing file is not an error — it
    /// yields the empty overlay plus a [`ConfigWarning::MissingOptionalField`].
    pub fn load(path: &Path) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        if !path.exists() {
            return Ok((
                Self::default(),
                vec![ConfigWarning::MissingOptionalField {
                    field: "namespace_aliases".to_string(),
                    hint: format!(
                        "{} not found; no namespace aliases loaded",
                        path.display()
                    ),
                }],
            ));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::FileNotFound {
            path: format!("{}: {e}", path.display()),
        })?;

        let overlay: Self = serde_yaml::from_str(&raw).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?;

        Ok((overlay, Vec::new()))
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for the correlator daemon, assembled
/// entirely from environment variables (plus the optional YAML overlay).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatorConfig {
    /// Listen port.
    pub port: u16,
    /// When `false`, the authentication middleware is omitted entirely.
    pub auth_enabled: bool,
    /// Three-tier rate-limiter settings.
    pub rate_limit: RateLimiterConfig,
    /// `debug`, `info`, `warn`, or `error`.
    pub log_level: String,
    /// Path to the optional namespace-alias YAML file.
    pub config_path: PathBuf,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        let mut errors = Vec::new();
        let config = Self::build(&mut errors);
        debug_assert!(errors.is_empty(), "default config must not fail validation");
        config
    }
}

impl CorrelatorConfig {
    /// Loads configuration from the process environment, falling back to
    /// the documented defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut errors = Vec::new();
        let config = Self::build(&mut errors);
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::ValidationError { reasons: errors })
        }
    }

    fn build(errors: &mut Vec<String>) -> Self {
        Self {
            port: env_parsed("CORRELATOR_PORT", 8080, errors),
            auth_enabled: env_bool("CORRELATOR_AUTH_ENABLED", false, errors),
            rate_limit: RateLimiterConfig::from_env(errors),
            log_level: env_string("LOG_LEVEL", "info"),
            config_path: PathBuf::from(env_string("CORRELATOR_CONFIG_PATH", ".correlator.yaml")),
        }
    }

    /// Loads the namespace-alias overlay from [`Self::config_path`].
    pub fn load_namespace_aliases(&self) -> Result<(NamespaceAliasOverlay, Vec<ConfigWarning>), ConfigError> {
        NamespaceAliasOverlay::load(&self.config_path)
    }
}
