//! Type definitions for consistency scans, repairs and rebuilds.

use serde::{Deserialize, Serialize};

use crate::inconsistency::Inconsistency;

/// Output of a consistency scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Vector records scanned.
    pub total_checked: usize,
    pub inconsistencies: Vec<Inconsistency>,
    /// Records whose anchor lookup failed, so their state is unknown.
    pub failed: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl ConsistencyReport {
    /// Whether every scanned record has its anchor node.
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty() && self.failed == 0
    }
}

/// Result of a repair, full sync or rebuild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Records (or inconsistencies, for a bare repair) processed.
    pub total_checked: usize,
    /// Inconsistencies detected or handed in.
    pub inconsistencies: Vec<Inconsistency>,
    pub repaired: usize,
    pub failed: usize,
    /// Inconsistencies that needed no action.
    pub skipped: usize,
    /// Entity relationships recreated. Rebuilds never recreate them.
    pub relationships_rebuilt: usize,
    /// Records whose entity relationships were not recreated.
    pub relationships_skipped: usize,
    /// One message per failed record.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl SyncResult {
    /// Number of inconsistencies in the result.
    pub fn inconsistency_count(&self) -> usize {
        self.inconsistencies.len()
    }

    /// No record failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub(crate) fn record_failure(&mut self, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(message.into());
    }
}

/// Options for [`SyncService::full_sync`](super::SyncService::full_sync).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FullSyncOptions {
    pub user_id: Option<String>,
    /// Falls back to the configured default limit.
    pub limit: Option<usize>,
    /// Detect only; make no graph writes.
    pub dry_run: bool,
}

impl FullSyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Options for [`SyncService::rebuild_graph`](super::SyncService::rebuild_graph).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildOptions {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
    /// Wipe the whole graph and recreate its indexes first.
    pub clear_existing: bool,
}

impl RebuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn clear_existing(mut self) -> Self {
        self.clear_existing = true;
        self
    }
}

/// Raw counts across both stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Live vector records.
    pub vector_count: u64,
    /// Anchor nodes.
    pub graph_count: u64,
    pub graph_relationships: u64,
    /// 0-100.
    pub sync_percentage: u8,
}
