//! Dual-write coordinator.
//!
//! Writes go to the vector store first. Only once that write has succeeded is
//! the graph projection touched, and a graph failure is reported as an
//! inconsistency instead of failing the call (except for `store` under
//! rollback).

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use super::types::{
    sync_percentage, DeleteRequest, HealthCheck, HealthMetrics, HealthStatus, PersistenceMetadata,
    PersistenceResult, StoreHealth, StoreRequest, UpdateRequest,
};
use crate::config::PersistenceConfig;
use crate::deadline::{graph_op, vector_op};
use crate::error::{Error, Result};
use crate::graph::{AnchorNode, GraphQuery, GraphStore};
use crate::inconsistency::{Inconsistency, InconsistencySink, TracingSink};
use crate::memory::{Entity, MemoryId, MemoryRecord, VectorStore};

/// Coordinates writes of one memory record across both stores.
///
/// Holds no mutable state besides its collaborators, so one instance can
/// serve concurrent calls. Calls racing on the same id are not ordered.
pub struct PersistenceCoordinator {
    config: PersistenceConfig,
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    sink: Arc<dyn InconsistencySink>,
}

impl PersistenceCoordinator {
    /// Create a coordinator that logs inconsistencies through `tracing`.
    pub fn new(
        config: PersistenceConfig,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            config,
            vector,
            graph,
            sink: Arc::new(TracingSink),
        }
    }

    /// Replace the inconsistency sink.
    pub fn with_sink(mut self, sink: Arc<dyn InconsistencySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Store a new memory.
    ///
    /// Returns `Err` only when a graph failure was escalated by
    /// `rollback_on_partial_failure`; every other failure is reported in the
    /// returned result.
    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, entities = request.entities.len())
    )]
    pub async fn store(&self, request: StoreRequest) -> Result<PersistenceResult<MemoryRecord>> {
        let started = Instant::now();
        if let Some(result) = self.vector_disabled(started) {
            return Ok(result);
        }

        let (memory, entities) = request.into_parts();
        let record = match self.vector_call("insert", self.vector.insert(memory)).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "vector insert failed");
                return Ok(PersistenceResult::fatal(
                    e,
                    PersistenceMetadata::finish(started, false, false),
                ));
            }
        };
        debug!(memory_id = %record.id, "vector record written");

        if !self.graph_enabled() {
            return Ok(PersistenceResult::ok(
                record,
                PersistenceMetadata::finish(started, true, false),
            ));
        }

        match self.project(&record, Some(entities.as_slice()), false).await {
            Ok(()) => {
                info!(memory_id = %record.id, "memory stored in both stores");
                Ok(PersistenceResult::ok(
                    record,
                    PersistenceMetadata::finish(started, true, true),
                ))
            }
            Err(graph_err) => {
                self.report(Inconsistency::missing_in_graph(
                    record.id,
                    format!("graph write failed on store: {}", graph_err),
                ))
                .await;
                if self.config.rollback_on_partial_failure {
                    return Err(self.roll_back(&record.id, graph_err).await);
                }
                Ok(PersistenceResult::recovered(
                    record,
                    graph_err,
                    PersistenceMetadata::finish(started, true, false),
                ))
            }
        }
    }

    /// Apply a partial update.
    ///
    /// The anchor is re-merged with the new content. When the request carries
    /// entities, the record's relationships are replaced by them. Graph
    /// failures never undo the vector update.
    #[instrument(skip(self, request), fields(memory_id = %request.id))]
    pub async fn update(&self, request: UpdateRequest) -> PersistenceResult<MemoryRecord> {
        let started = Instant::now();
        if let Some(result) = self.vector_disabled(started) {
            return result;
        }

        let UpdateRequest {
            id,
            patch,
            entities,
        } = request;
        let record = match self.vector_call("update", self.vector.update(&id, patch)).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "vector update failed");
                return PersistenceResult::fatal(
                    e,
                    PersistenceMetadata::finish(started, false, false),
                );
            }
        };

        if !self.graph_enabled() {
            return PersistenceResult::ok(record, PersistenceMetadata::finish(started, true, false));
        }

        match self.project(&record, entities.as_deref(), true).await {
            Ok(()) => {
                debug!("memory updated in both stores");
                PersistenceResult::ok(record, PersistenceMetadata::finish(started, true, true))
            }
            Err(graph_err) => {
                self.report(Inconsistency::missing_in_graph(
                    record.id,
                    format!("graph write failed on update: {}", graph_err),
                ))
                .await;
                PersistenceResult::recovered(
                    record,
                    graph_err,
                    PersistenceMetadata::finish(started, true, false),
                )
            }
        }
    }

    /// Soft or hard delete, optionally cascading to the anchor node.
    #[instrument(skip(self, request), fields(memory_id = %request.id, hard = request.hard))]
    pub async fn delete(&self, request: DeleteRequest) -> PersistenceResult<MemoryId> {
        let started = Instant::now();
        if let Some(result) = self.vector_disabled(started) {
            return result;
        }

        let id = request.id;
        if let Err(e) = self
            .vector_call("delete", self.vector.delete(&id, request.hard))
            .await
        {
            warn!(error = %e, "vector delete failed");
            return PersistenceResult::fatal(e, PersistenceMetadata::finish(started, false, false));
        }

        if !request.cascade_graph || !self.graph_enabled() {
            return PersistenceResult::ok(id, PersistenceMetadata::finish(started, true, false));
        }

        match self.graph_run(&GraphQuery::DeleteAnchor { memory_id: id }).await {
            Ok(()) => {
                debug!("anchor node removed");
                PersistenceResult::ok(id, PersistenceMetadata::finish(started, true, true))
            }
            Err(graph_err) => {
                self.report(Inconsistency::missing_in_vector(
                    id,
                    format!("anchor outlived deleted record: {}", graph_err),
                ))
                .await;
                PersistenceResult::recovered(
                    id,
                    graph_err,
                    PersistenceMetadata::finish(started, true, false),
                )
            }
        }
    }

    /// Probe both stores concurrently and compute the sync metrics.
    #[instrument(skip(self))]
    pub async fn get_health(&self) -> HealthCheck {
        let ((vector_store, vector_count), (graph_store, graph_count)) =
            futures::join!(self.probe_vector(), self.probe_graph());

        let status = HealthStatus::from_stores(vector_store.healthy, graph_store.healthy);
        if status != HealthStatus::Healthy {
            warn!(%status, "store health check not healthy");
        }

        HealthCheck {
            status,
            vector_store,
            graph_store,
            metrics: HealthMetrics {
                total_memories: vector_count,
                vector_store_count: vector_count,
                graph_store_count: graph_count,
                sync_percentage: sync_percentage(vector_count, vector_count, graph_count),
            },
        }
    }

    async fn probe_vector(&self) -> (StoreHealth, u64) {
        if !self.config.enable_vector_store {
            return (StoreHealth::down(false, "vector store disabled"), 0);
        }
        match self.vector_call("stats", self.vector.stats(None)).await {
            Ok(stats) => (StoreHealth::up(), stats.total),
            Err(e) => (StoreHealth::down(false, e.to_string()), 0),
        }
    }

    async fn probe_graph(&self) -> (StoreHealth, u64) {
        if !self.config.enable_graph_store {
            return (StoreHealth::down(false, "graph store disabled"), 0);
        }
        if !self.graph.is_configured() {
            return (StoreHealth::down(false, "graph store not configured"), 0);
        }

        match self
            .graph_call("verify_connection", self.graph.verify_connection())
            .await
        {
            Ok(true) => {}
            Ok(false) => return (StoreHealth::down(false, "connection check failed"), 0),
            Err(e) => return (StoreHealth::down(false, e.to_string()), 0),
        }

        match self.graph_call("stats", self.graph.stats()).await {
            Ok(stats) => (StoreHealth::up(), stats.anchor_count()),
            Err(e) => (StoreHealth::down(true, e.to_string()), 0),
        }
    }

    /// Write the anchor, then the entity relationships.
    ///
    /// With `replace_mentions`, supplied entities replace the existing
    /// relationships instead of adding to them.
    async fn project(
        &self,
        record: &MemoryRecord,
        entities: Option<&[Entity]>,
        replace_mentions: bool,
    ) -> Result<()> {
        self.graph_run(&GraphQuery::MergeAnchor {
            anchor: AnchorNode::from_record(record),
        })
        .await?;

        let Some(entities) = entities else {
            return Ok(());
        };
        if replace_mentions {
            self.graph_run(&GraphQuery::RemoveMentions {
                memory_id: record.id,
            })
            .await?;
        }
        for entity in entities {
            self.graph_run(&GraphQuery::MergeEntityMention {
                memory_id: record.id,
                entity: entity.clone(),
            })
            .await?;
        }
        debug!("projected {} entities", entities.len());
        Ok(())
    }

    /// Hard-delete a record whose graph write failed and produce the error
    /// returned to the caller.
    ///
    /// The anchor may already exist when a later entity write failed. It is
    /// removed too, and reported as `missing_in_vector` if that fails.
    async fn roll_back(&self, id: &MemoryId, cause: Error) -> Error {
        warn!(memory_id = %id, error = %cause, "graph write failed, rolling back vector record");

        if let Err(rollback_err) = self
            .vector_call("rollback", self.vector.delete(id, true))
            .await
        {
            error!(memory_id = %id, error = %rollback_err, "rollback failed");
            return Error::graph_store(
                "store",
                format!("{}; rollback failed: {}", cause, rollback_err),
            );
        }
        info!(memory_id = %id, "vector record rolled back");

        let cleanup = GraphQuery::DeleteAnchor { memory_id: *id };
        if let Err(e) = self.graph_run(&cleanup).await {
            warn!(memory_id = %id, error = %e, "anchor cleanup after rollback failed");
            self.report(Inconsistency::missing_in_vector(
                *id,
                format!("anchor outlived rolled back record: {}", e),
            ))
            .await;
        }
        cause
    }

    fn vector_disabled<T>(&self, started: Instant) -> Option<PersistenceResult<T>> {
        if self.config.enable_vector_store {
            return None;
        }
        debug!("vector store disabled, skipping write");
        Some(PersistenceResult::fatal(
            Error::Config("vector store disabled".to_string()),
            PersistenceMetadata::finish(started, false, false),
        ))
    }

    fn graph_enabled(&self) -> bool {
        if !self.config.enable_graph_store {
            return false;
        }
        if !self.graph.is_configured() {
            debug!("graph store not configured, skipping projection");
            return false;
        }
        true
    }

    async fn report(&self, inconsistency: Inconsistency) {
        self.sink.record(&inconsistency).await;
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

    async fn graph_run(&self, query: &GraphQuery) -> Result<()> {
        self.graph_call(query.name(), self.graph.run(query)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{decode_rows, find_anchor, Mention};
    use crate::inconsistency::{InconsistencyKind, RecordingSink};
    use crate::memory::{MemoryPatch, Patch};
    use crate::persistence::Outcome;
    use crate::sync::SyncService;
    use crate::testing::{FlakyGraphStore, FlakyVectorStore};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        vector: Arc<FlakyVectorStore>,
        graph: Arc<FlakyGraphStore>,
        sink: Arc<RecordingSink>,
        coordinator: PersistenceCoordinator,
    }

    fn harness(config: PersistenceConfig) -> Harness {
        let vector = Arc::new(FlakyVectorStore::new());
        let graph = Arc::new(FlakyGraphStore::new());
        let sink = Arc::new(RecordingSink::new());
        let coordinator = PersistenceCoordinator::new(config, vector.clone(), graph.clone())
            .with_sink(sink.clone());
        Harness {
            vector,
            graph,
            sink,
            coordinator,
        }
    }

    fn entities() -> Vec<Entity> {
        vec![
            Entity::new("person", "Ada Lovelace"),
            Entity::new("topic", "engines"),
        ]
    }

    async fn mentions(graph: &FlakyGraphStore, memory_id: MemoryId) -> Vec<Mention> {
        decode_rows(
            graph
                .inner()
                .query(&GraphQuery::FindMentions { memory_id })
                .await
                .unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_store_writes_both_stores() {
        let h = harness(PersistenceConfig::default());
        let result = h
            .coordinator
            .store(StoreRequest::new("alice", "Ada designed engines").with_entities(entities()))
            .await
            .unwrap();

        assert!(result.success());
        assert!(result.is_consistent());
        assert!(result.metadata.vector_write_success);
        assert!(result.metadata.graph_write_success);

        let record = result.data.unwrap();
        let anchor = find_anchor(h.graph.inner(), record.id).await.unwrap().unwrap();
        assert_eq!(anchor.content, "Ada designed engines");
        assert_eq!(mentions(&h.graph, record.id).await.len(), 2);
        assert!(h.sink.is_empty());
    }

    #[tokio::test]
    async fn test_store_with_graph_disabled() {
        let h = harness(PersistenceConfig::default().with_graph_store(false));
        let result = h
            .coordinator
            .store(StoreRequest::new("alice", "note").with_entities(entities()))
            .await
            .unwrap();

        assert!(result.success());
        assert!(result.metadata.vector_write_success);
        assert!(!result.metadata.graph_write_success);
        assert_eq!(h.graph.write_count(), 0);
    }

    #[tokio::test]
    async fn test_store_graph_failure_is_recovered() {
        let h = harness(PersistenceConfig::default());
        h.graph.fail_writes.store(true, Ordering::SeqCst);

        let result = h
            .coordinator
            .store(StoreRequest::new("alice", "note").with_entities(entities()))
            .await
            .unwrap();

        assert!(result.success());
        assert!(matches!(result.outcome, Outcome::Recovered(_)));
        assert!(result.error().unwrap().is_graph_store());
        assert!(!result.metadata.graph_write_success);

        let id = result.data.unwrap().id;
        assert!(h.vector.inner().get_by_id(&id, false).await.unwrap().is_some());

        let recorded = h.sink.snapshot();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].memory_id, id);
        assert_eq!(recorded[0].issue, InconsistencyKind::MissingInGraph);
    }

    #[tokio::test]
    async fn test_store_graph_failure_rolls_back() {
        let h = harness(PersistenceConfig::default().with_rollback_on_partial_failure(true));
        h.graph.fail_mentions.store(true, Ordering::SeqCst);

        let err = h
            .coordinator
            .store(StoreRequest::new("alice", "note").with_entities(entities()))
            .await
            .unwrap_err();
        assert!(err.is_graph_store());

        let stats = h.vector.inner().stats(None).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.deleted, 0);
        assert_eq!(h.graph.inner().stats().await.unwrap().anchor_count(), 0);

        let recorded = h.sink.snapshot();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].issue, InconsistencyKind::MissingInGraph);
    }

    #[tokio::test]
    async fn test_orphan_anchor_after_rollback_is_repairable() {
        let h = harness(PersistenceConfig::default().with_rollback_on_partial_failure(true));
        h.graph.fail_mentions.store(true, Ordering::SeqCst);
        h.graph.fail_anchor_deletes.store(true, Ordering::SeqCst);

        h.coordinator
            .store(StoreRequest::new("alice", "note").with_entities(entities()))
            .await
            .unwrap_err();
        assert_eq!(h.vector.inner().stats(None).await.unwrap().total, 0);
        assert_eq!(h.graph.inner().stats().await.unwrap().anchor_count(), 1);

        let recorded = h.sink.drain();
        let kinds: Vec<_> = recorded.iter().map(|i| i.issue).collect();
        assert_eq!(
            kinds,
            vec![
                InconsistencyKind::MissingInGraph,
                InconsistencyKind::MissingInVector
            ]
        );

        h.graph.fail_anchor_deletes.store(false, Ordering::SeqCst);
        let sync = SyncService::new(h.vector.clone(), h.graph.clone());
        let repaired = sync.repair_inconsistencies(&recorded[1..]).await;
        assert_eq!(repaired.repaired, 1);
        assert_eq!(h.graph.inner().stats().await.unwrap().anchor_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_rollback_is_reported() {
        let h = harness(PersistenceConfig::default().with_rollback_on_partial_failure(true));
        h.graph.fail_writes.store(true, Ordering::SeqCst);
        h.vector.fail_deletes.store(true, Ordering::SeqCst);

        let err = h
            .coordinator
            .store(StoreRequest::new("alice", "note"))
            .await
            .unwrap_err();
        assert!(err.is_graph_store());
        assert!(err.to_string().contains("rollback failed"));

        assert_eq!(h.vector.inner().stats(None).await.unwrap().total, 1);
        let recorded = h.sink.snapshot();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].issue, InconsistencyKind::MissingInGraph);
    }

    #[tokio::test]
    async fn test_store_vector_failure_is_fatal() {
        let h = harness(PersistenceConfig::default());
        h.vector.fail_writes.store(true, Ordering::SeqCst);

        let result = h
            .coordinator
            .store(StoreRequest::new("alice", "note").with_entities(entities()))
            .await
            .unwrap();

        assert!(!result.success());
        assert!(result.data.is_none());
        assert!(result.error().unwrap().is_vector_store());
        assert!(!result.metadata.vector_write_success);
        assert_eq!(h.graph.write_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_vector_store_fails_every_write() {
        let h = harness(PersistenceConfig::default().with_vector_store(false));

        let stored = h
            .coordinator
            .store(StoreRequest::new("alice", "note"))
            .await
            .unwrap();
        assert!(!stored.success());
        assert!(matches!(stored.error(), Some(Error::Config(_))));
        assert!(!stored.metadata.vector_write_success);

        let id = MemoryId::new();
        let updated = h
            .coordinator
            .update(UpdateRequest::new(id, MemoryPatch::new().content("x")))
            .await;
        assert!(!updated.success());

        let deleted = h.coordinator.delete(DeleteRequest::new(id)).await;
        assert!(!deleted.success());
        assert_eq!(h.graph.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graph_timeout_counts_as_graph_failure() {
        let h = harness(PersistenceConfig::default().with_store_timeout_ms(100));
        h.graph.set_delay(Duration::from_secs(5));

        let result = h
            .coordinator
            .store(StoreRequest::new("alice", "slow graph"))
            .await
            .unwrap();

        assert!(result.success());
        let err = result.error().unwrap();
        assert!(err.is_graph_store());
        assert!(err.to_string().contains("timed out after 100ms"));
        assert_eq!(h.sink.len(), 1);
    }

    #[tokio::test]
    async fn test_update_rewrites_relationships() {
        let h = harness(PersistenceConfig::default());
        let record = h
            .coordinator
            .store(StoreRequest::new("alice", "Ada designed engines").with_entities(entities()))
            .await
            .unwrap()
            .data
            .unwrap();

        let result = h
            .coordinator
            .update(
                UpdateRequest::new(
                    record.id,
                    MemoryPatch::new()
                        .content("Grace wrote compilers")
                        .summary(Patch::Set("compilers".to_string())),
                )
                .with_entities(vec![Entity::new("person", "Grace Hopper")]),
            )
            .await;

        assert!(result.success() && result.is_consistent());
        assert_eq!(result.data.unwrap().summary.as_deref(), Some("compilers"));

        let found = mentions(&h.graph, record.id).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "person:grace hopper");

        let anchor = find_anchor(h.graph.inner(), record.id).await.unwrap().unwrap();
        assert_eq!(anchor.content, "Grace wrote compilers");
    }

    #[tokio::test]
    async fn test_update_without_entities_keeps_relationships() {
        let h = harness(PersistenceConfig::default());
        let record = h
            .coordinator
            .store(StoreRequest::new("alice", "Ada designed engines").with_entities(entities()))
            .await
            .unwrap()
            .data
            .unwrap();

        let result = h
            .coordinator
            .update(UpdateRequest::new(record.id, MemoryPatch::new().importance(9)))
            .await;

        assert!(result.success());
        assert_eq!(result.data.unwrap().importance, 9);
        assert_eq!(mentions(&h.graph, record.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_update_graph_failure_never_rolls_back() {
        let h = harness(PersistenceConfig::default().with_rollback_on_partial_failure(true));
        let record = h
            .coordinator
            .store(StoreRequest::new("alice", "before"))
            .await
            .unwrap()
            .data
            .unwrap();

        h.graph.fail_writes.store(true, Ordering::SeqCst);
        let result = h
            .coordinator
            .update(UpdateRequest::new(record.id, MemoryPatch::new().content("after")))
            .await;

        assert!(result.success());
        assert!(!result.metadata.graph_write_success);
        let stored = h
            .vector
            .inner()
            .get_by_id(&record.id, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.content, "after");
        assert_eq!(h.sink.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_fatal() {
        let h = harness(PersistenceConfig::default());
        let result = h
            .coordinator
            .update(UpdateRequest::new(MemoryId::new(), MemoryPatch::new().content("x")))
            .await;

        assert!(!result.success());
        assert!(result.error().unwrap().is_vector_store());
        assert_eq!(h.graph.write_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_graph() {
        let h = harness(PersistenceConfig::default());
        let record = h
            .coordinator
            .store(StoreRequest::new("alice", "note").with_entities(entities()))
            .await
            .unwrap()
            .data
            .unwrap();

        let result = h.coordinator.delete(DeleteRequest::new(record.id)).await;
        assert!(result.success() && result.is_consistent());

        assert!(h.vector.inner().get_by_id(&record.id, false).await.unwrap().is_none());
        assert!(h.vector.inner().get_by_id(&record.id, true).await.unwrap().is_some());
        assert!(find_anchor(h.graph.inner(), record.id).await.unwrap().is_none());
        assert_eq!(h.graph.inner().stats().await.unwrap().mention_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_without_cascade_keeps_anchor() {
        let h = harness(PersistenceConfig::default());
        let record = h
            .coordinator
            .store(StoreRequest::new("alice", "note"))
            .await
            .unwrap()
            .data
            .unwrap();

        let result = h
            .coordinator
            .delete(DeleteRequest::new(record.id).hard().without_cascade())
            .await;
        assert!(result.success());
        assert!(!result.metadata.graph_write_success);

        assert!(h.vector.inner().get_by_id(&record.id, true).await.unwrap().is_none());
        assert!(find_anchor(h.graph.inner(), record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_graph_failure_is_recovered() {
        let h = harness(PersistenceConfig::default());
        let record = h
            .coordinator
            .store(StoreRequest::new("alice", "note"))
            .await
            .unwrap()
            .data
            .unwrap();

        h.graph.fail_writes.store(true, Ordering::SeqCst);
        let result = h.coordinator.delete(DeleteRequest::new(record.id).hard()).await;

        assert!(result.success());
        assert_eq!(result.data, Some(record.id));
        assert!(result.error().unwrap().is_graph_store());

        let recorded = h.sink.drain();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].issue, InconsistencyKind::MissingInVector);
    }

    #[tokio::test]
    async fn test_health_all_healthy() {
        let h = harness(PersistenceConfig::default());
        for i in 0..3 {
            h.coordinator
                .store(StoreRequest::new("alice", format!("note {}", i)))
                .await
                .unwrap();
        }

        let health = h.coordinator.get_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.vector_store.available && health.graph_store.available);
        assert_eq!(
            health.metrics,
            HealthMetrics {
                total_memories: 3,
                vector_store_count: 3,
                graph_store_count: 3,
                sync_percentage: 100,
            }
        );
    }

    #[tokio::test]
    async fn test_health_empty_store_is_fully_synced() {
        let h = harness(PersistenceConfig::default());
        let health = h.coordinator.get_health().await;
        assert_eq!(health.metrics.total_memories, 0);
        assert_eq!(health.metrics.sync_percentage, 100);
    }

    #[tokio::test]
    async fn test_health_sync_percentage_tracks_missing_anchors() {
        let h = harness(PersistenceConfig::default());
        for i in 0..10 {
            if i == 7 {
                h.graph.fail_writes.store(true, Ordering::SeqCst);
            }
            h.coordinator
                .store(StoreRequest::new("alice", format!("note {}", i)))
                .await
                .unwrap();
        }
        h.graph.fail_writes.store(false, Ordering::SeqCst);

        let health = h.coordinator.get_health().await;
        assert_eq!(health.metrics.vector_store_count, 10);
        assert_eq!(health.metrics.graph_store_count, 7);
        assert_eq!(health.metrics.sync_percentage, 70);
    }

    #[tokio::test]
    async fn test_health_degraded_when_graph_unreachable() {
        let h = harness(PersistenceConfig::default());
        h.graph.set_unreachable(true);

        let health = h.coordinator.get_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.vector_store.healthy);
        assert!(!health.graph_store.available);
        assert!(health.graph_store.error.is_some());
    }

    #[tokio::test]
    async fn test_health_unhealthy_when_both_fail() {
        let h = harness(PersistenceConfig::default());
        h.graph.set_unreachable(true);
        h.vector.set_unreachable(true);

        let health = h.coordinator.get_health().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_health_with_vector_store_disabled() {
        let h = harness(PersistenceConfig::default().with_vector_store(false));

        let health = h.coordinator.get_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(!health.vector_store.available);
        assert_eq!(
            health.vector_store.error.as_deref(),
            Some("vector store disabled")
        );
        assert!(health.graph_store.healthy);
        assert_eq!(health.metrics.total_memories, 0);
    }

    #[tokio::test]
    async fn test_unconfigured_graph_is_skipped_and_unhealthy() {
        let h = harness(PersistenceConfig::default());
        h.graph.configured.store(false, Ordering::SeqCst);

        let result = h
            .coordinator
            .store(StoreRequest::new("alice", "note").with_entities(entities()))
            .await
            .unwrap();
        assert!(result.success());
        assert!(!result.metadata.graph_write_success);
        assert_eq!(h.graph.write_count(), 0);

        let health = h.coordinator.get_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(
            health.graph_store.error.as_deref(),
            Some("graph store not configured")
        );
    }
}
