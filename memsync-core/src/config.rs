//! Configuration for the persistence coordinator and sync service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default per-call store timeout in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 10_000;

/// Default number of records scanned by a sync batch.
pub const DEFAULT_SYNC_LIMIT: usize = 1000;

/// Configuration for [`PersistenceCoordinator`](crate::PersistenceCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Write to the vector store. When false every write reports
    /// `success = false` and nothing else is attempted.
    pub enable_vector_store: bool,
    /// Attempt graph writes after a successful vector write.
    pub enable_graph_store: bool,
    /// On `store`, turn a graph failure into a total failure by hard-deleting
    /// the freshly written vector record.
    pub rollback_on_partial_failure: bool,
    /// Per store call timeout in milliseconds (0 disables).
    pub store_timeout_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enable_vector_store: true,
            enable_graph_store: true,
            rollback_on_partial_failure: false,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

impl PersistenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables.
    ///
    /// - `MEMSYNC_ENABLE_VECTOR_STORE`
    /// - `MEMSYNC_ENABLE_GRAPH_STORE`
    /// - `MEMSYNC_ROLLBACK_ON_PARTIAL_FAILURE`
    /// - `MEMSYNC_STORE_TIMEOUT_MS`
    ///
    /// Flags accept `1`/`true`/`yes`/`on` and `0`/`false`/`no`/`off`, case
    /// insensitive. Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            enable_vector_store: parse_flag(lookup("MEMSYNC_ENABLE_VECTOR_STORE"))
                .unwrap_or(defaults.enable_vector_store),
            enable_graph_store: parse_flag(lookup("MEMSYNC_ENABLE_GRAPH_STORE"))
                .unwrap_or(defaults.enable_graph_store),
            rollback_on_partial_failure: parse_flag(lookup("MEMSYNC_ROLLBACK_ON_PARTIAL_FAILURE"))
                .unwrap_or(defaults.rollback_on_partial_failure),
            store_timeout_ms: parse_num(lookup("MEMSYNC_STORE_TIMEOUT_MS"))
                .unwrap_or(defaults.store_timeout_ms),
        }
    }

    /// Parse configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn with_vector_store(mut self, enabled: bool) -> Self {
        self.enable_vector_store = enabled;
        self
    }

    pub fn with_graph_store(mut self, enabled: bool) -> Self {
        self.enable_graph_store = enabled;
        self
    }

    pub fn with_rollback_on_partial_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_partial_failure = enabled;
        self
    }

    pub fn with_store_timeout_ms(mut self, ms: u64) -> Self {
        self.store_timeout_ms = ms;
        self
    }

    /// The per-call timeout, if one is configured.
    pub fn store_timeout(&self) -> Option<Duration> {
        timeout_from_ms(self.store_timeout_ms)
    }
}

/// Configuration for [`SyncService`](crate::SyncService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records scanned when the caller passes no limit.
    pub default_limit: usize,
    /// Per store call timeout in milliseconds (0 disables).
    pub store_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SYNC_LIMIT,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

impl SyncConfig {
    /// Create configuration from `MEMSYNC_SYNC_LIMIT` and
    /// `MEMSYNC_STORE_TIMEOUT_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            default_limit: parse_num(lookup("MEMSYNC_SYNC_LIMIT"))
                .unwrap_or(defaults.default_limit),
            store_timeout_ms: parse_num(lookup("MEMSYNC_STORE_TIMEOUT_MS"))
                .unwrap_or(defaults.store_timeout_ms),
        }
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_store_timeout_ms(mut self, ms: u64) -> Self {
        self.store_timeout_ms = ms;
        self
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        timeout_from_ms(self.store_timeout_ms)
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_flag(value: Option<String>) -> Option<bool> {
    match value?.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_num<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value?.trim().parse().ok()
}
