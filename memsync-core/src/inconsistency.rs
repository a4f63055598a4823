//! Inconsistencies between the vector store and the graph projection, and
//! the hook through which they are reported.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::warn;

use crate::memory::MemoryId;

/// Kind of drift detected for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// The record exists in the vector store but has no anchor node.
    MissingInGraph,
    /// An anchor node outlived its vector record.
    MissingInVector,
}

impl InconsistencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingInGraph => "missing_in_graph",
            Self::MissingInVector => "missing_in_vector",
        }
    }
}

impl std::fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected mismatch for one memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    pub memory_id: MemoryId,
    pub issue: InconsistencyKind,
    pub details: String,
    pub detected_at: DateTime<Utc>,
}

impl Inconsistency {
    pub fn new(memory_id: MemoryId, issue: InconsistencyKind, details: impl Into<String>) -> Self {
        Self {
            memory_id,
            issue,
            details: details.into(),
            detected_at: Utc::now(),
        }
    }

    pub fn missing_in_graph(memory_id: MemoryId, details: impl Into<String>) -> Self {
        Self::new(memory_id, InconsistencyKind::MissingInGraph, details)
    }

    pub fn missing_in_vector(memory_id: MemoryId, details: impl Into<String>) -> Self {
        Self::new(memory_id, InconsistencyKind::MissingInVector, details)
    }
}

/// Destination for inconsistencies found on the write path.
///
/// Recording must not fail the write that found the problem, so the hook has
/// no error channel; implementations deal with their own failures.
#[async_trait]
pub trait InconsistencySink: Send + Sync {
    async fn record(&self, inconsistency: &Inconsistency);
}

/// Logs every inconsistency at `warn` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl InconsistencySink for TracingSink {
    async fn record(&self, inconsistency: &Inconsistency) {
        warn!(
            memory_id = %inconsistency.memory_id,
            issue = %inconsistency.issue,
            details = %inconsistency.details,
            "store inconsistency detected"
        );
    }
}

/// Logs and keeps inconsistencies in memory so a later repair can drain them.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<Inconsistency>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<Inconsistency> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Take everything recorded so far.
    pub fn drain(&self) -> Vec<Inconsistency> {
        self.entries
            .lock()
            .map(|mut entries| std::mem::take(&mut *entries))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InconsistencySink for RecordingSink {
    async fn record(&self, inconsistency: &Inconsistency) {
        TracingSink.record(inconsistency).await;
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(inconsistency.clone());
        }
    }
}
