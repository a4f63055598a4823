//! Consistency scanning, repair and graph rebuild.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::types::{ConsistencyReport, FullSyncOptions, RebuildOptions, SyncResult, SyncStats};
use crate::config::SyncConfig;
use crate::deadline::{graph_op, vector_op};
use crate::error::{Error, Result};
use crate::graph::{find_anchor, AnchorNode, GraphQuery, GraphStore};
use crate::inconsistency::{Inconsistency, InconsistencyKind};
use crate::memory::{MemoryId, MemoryRecord, RecentQuery, VectorStore};
use crate::persistence::sync_percentage;

/// Detects and heals drift between the vector store and its graph
/// projection.
///
/// Every job is a bounded batch over the most recent records. Jobs that
/// write to the graph hold an internal lock, so two of them never run
/// concurrently on the same service.
pub struct SyncService {
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    config: SyncConfig,
    job_lock: Mutex<()>,
}

impl SyncService {
    /// Create a sync service with default configuration.
    pub fn new(vector: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>) -> Self {
        Self {
            vector,
            graph,
            config: SyncConfig::default(),
            job_lock: Mutex::new(()),
        }
    }

    /// Create with custom configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Look up the anchor node of up to `limit` recent live records.
    ///
    /// Only `missing_in_graph` is produced: the scan enumerates the vector
    /// store, so it cannot see anchors without a record. A failed lookup is
    /// counted in `failed` and does not stop the scan; a failed read of the
    /// vector store does.
    #[instrument(skip(self))]
    pub async fn check_consistency(
        &self,
        user_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<ConsistencyReport> {
        self.scan(user_id, limit).await
    }

    /// Repair the given inconsistencies one by one.
    ///
    /// `missing_in_graph` gets a minimal anchor node through a create-if-absent
    /// write; entity relationships are not recreated. `missing_in_vector`
    /// removes the stale anchor when the record is really gone and is skipped
    /// otherwise.
    #[instrument(skip(self, inconsistencies), fields(count = inconsistencies.len()))]
    pub async fn repair_inconsistencies(&self, inconsistencies: &[Inconsistency]) -> SyncResult {
        let _job = self.job_lock.lock().await;
        self.repair(inconsistencies).await
    }

    /// Scan and, unless `dry_run`, repair what the scan found.
    #[instrument(skip(self))]
    pub async fn full_sync(&self, options: FullSyncOptions) -> Result<SyncResult> {
        let _job = self.job_lock.lock().await;
        let started = Instant::now();

        let report = self
            .scan(options.user_id.as_deref(), options.limit)
            .await?;

        let mut result = if options.dry_run || report.inconsistencies.is_empty() {
            SyncResult::default()
        } else {
            self.repair(&report.inconsistencies).await
        };

        result.total_checked = report.total_checked;
        result.inconsistencies = report.inconsistencies;
        result.failed += report.failed;
        let mut errors = report.errors;
        errors.append(&mut result.errors);
        result.errors = errors;
        result.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            checked = result.total_checked,
            found = result.inconsistency_count(),
            repaired = result.repaired,
            failed = result.failed,
            dry_run = options.dry_run,
            "full sync complete"
        );
        Ok(result)
    }

    /// Recreate anchor nodes from the vector store.
    ///
    /// Entity relationships cannot be rebuilt without re-running extraction,
    /// so each rebuilt record is counted in `relationships_skipped`.
    #[instrument(skip(self))]
    pub async fn rebuild_graph(&self, options: RebuildOptions) -> Result<SyncResult> {
        let _job = self.job_lock.lock().await;
        let started = Instant::now();

        if options.clear_existing {
            warn!("clearing graph store before rebuild");
            self.graph_call("clear_all", self.graph.clear_all()).await?;
            self.graph_call("create_indexes", self.graph.create_indexes())
                .await?;
        }

        let records = self.recent(options.user_id.as_deref(), options.limit).await?;
        let mut result = SyncResult {
            total_checked: records.len(),
            ..Default::default()
        };

        for record in &records {
            let query = GraphQuery::EnsureAnchor {
                anchor: AnchorNode::repaired(record),
            };
            match self.graph_call(query.name(), self.graph.run(&query)).await {
                Ok(()) => {
                    result.repaired += 1;
                    result.relationships_skipped += 1;
                }
                Err(e) => {
                    result.record_failure(Error::sync(record.id, e.to_string()).to_string());
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            rebuilt = result.repaired,
            failed = result.failed,
            relationships_skipped = result.relationships_skipped,
            "graph rebuild complete"
        );
        Ok(result)
    }

    /// Counts from both stores, without availability probing.
    pub async fn get_stats(&self) -> Result<SyncStats> {
        let vector = self.vector_call("stats", self.vector.stats(None)).await?;
        let graph = self.graph_call("stats", self.graph.stats()).await?;

        Ok(SyncStats {
            vector_count: vector.total,
            graph_count: graph.anchor_count(),
            graph_relationships: graph.total_relationships(),
            sync_percentage: sync_percentage(vector.total, vector.total, graph.anchor_count()),
        })
    }

    async fn scan(&self, user_id: Option<&str>, limit: Option<usize>) -> Result<ConsistencyReport> {
        let started = Instant::now();
        let records = self.recent(user_id, limit).await?;
        let mut report = ConsistencyReport {
            total_checked: records.len(),
            ..Default::default()
        };

        for record in &records {
            let lookup = self.graph_call(
                "find_anchor",
                find_anchor(self.graph.as_ref(), record.id),
            );
            match lookup.await {
                Ok(Some(_)) => {}
                Ok(None) => report.inconsistencies.push(Inconsistency::missing_in_graph(
                    record.id,
                    "memory exists in vector store but has no anchor node",
                )),
                Err(e) => {
                    report.failed += 1;
                    report
                        .errors
                        .push(Error::sync(record.id, e.to_string()).to_string());
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            "checked {} records, {} missing in graph, {} failed",
            report.total_checked,
            report.inconsistencies.len(),
            report.failed
        );
        Ok(report)
    }

    async fn repair(&self, inconsistencies: &[Inconsistency]) -> SyncResult {
        let started = Instant::now();
        let mut result = SyncResult {
            total_checked: inconsistencies.len(),
            inconsistencies: inconsistencies.to_vec(),
            ..Default::default()
        };

        for inconsistency in inconsistencies {
            let id = inconsistency.memory_id;
            let outcome = match inconsistency.issue {
                InconsistencyKind::MissingInGraph => self.restore_anchor(id).await,
                InconsistencyKind::MissingInVector => self.remove_stale_anchor(id).await,
            };
            match outcome {
                Ok(true) => result.repaired += 1,
                Ok(false) => result.skipped += 1,
                Err(e) => {
                    warn!(memory_id = %id, error = %e, "repair failed");
                    result.record_failure(e.to_string());
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            repaired = result.repaired,
            skipped = result.skipped,
            failed = result.failed,
            "repair complete"
        );
        result
    }

    /// Recreate the anchor of a live record. `Ok(true)` when written.
    async fn restore_anchor(&self, id: MemoryId) -> Result<bool> {
        let record = self
            .vector_call("get_by_id", self.vector.get_by_id(&id, false))
            .await
            .map_err(|e| Error::sync(id, e.to_string()))?
            .ok_or_else(|| Error::sync(id, "record no longer exists in vector store"))?;

        let query = GraphQuery::EnsureAnchor {
            anchor: AnchorNode::repaired(&record),
        };
        self.graph_call(query.name(), self.graph.run(&query))
            .await
            .map_err(|e| Error::sync(id, e.to_string()))?;
        Ok(true)
    }

    /// Delete an anchor whose record is gone. `Ok(false)` when the record is
    /// still live and the anchor is legitimate.
    async fn remove_stale_anchor(&self, id: MemoryId) -> Result<bool> {
        let live = self
            .vector_call("get_by_id", self.vector.get_by_id(&id, false))
            .await
            .map_err(|e| Error::sync(id, e.to_string()))?;
        if live.is_some() {
            return Ok(false);
        }

        let query = GraphQuery::DeleteAnchor { memory_id: id };
        self.graph_call(query.name(), self.graph.run(&query))
            .await
            .map_err(|e| Error::sync(id, e.to_string()))?;
        Ok(true)
    }

    async fn recent(
        &self,
        user_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        let query = RecentQuery::new(limit.unwrap_or(self.config.default_limit));
        self.vector_call("get_recent", self.vector.get_recent(user_id, &query))
            .await
    }

    async fn vector_call<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        vector_op(self.config.store_timeout(), operation, fut).await
    }

    async fn graph_call<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        graph_op(self.config.store_timeout(), operation, fut).await
    }
}
