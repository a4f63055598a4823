//! Fault-injecting store wrappers used by the coordinator and sync tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::graph::{GraphQuery, GraphRow, GraphStats, GraphStore, SqliteGraphStore};
use crate::memory::{
    MemoryId, MemoryPatch, MemoryRecord, NewMemory, RecentQuery, SqliteVectorStore, VectorStats,
    VectorStore,
};

fn injected(flag: &AtomicBool, store: &str, operation: &str) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(Error::Internal(format!(
            "injected {} failure in {}",
            store, operation
        )));
    }
    Ok(())
}

/// In-memory vector store whose reads, writes and deletes can be made to fail.
pub(crate) struct FlakyVectorStore {
    inner: SqliteVectorStore,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FlakyVectorStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteVectorStore::in_memory().unwrap(),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &SqliteVectorStore {
        &self.inner
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.fail_writes.store(unreachable, Ordering::SeqCst);
        self.fail_reads.store(unreachable, Ordering::SeqCst);
        self.fail_deletes.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for FlakyVectorStore {
    async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord> {
        injected(&self.fail_writes, "vector", "insert")?;
        self.inner.insert(memory).await
    }

    async fn update(&self, id: &MemoryId, patch: MemoryPatch) -> Result<MemoryRecord> {
        injected(&self.fail_writes, "vector", "update")?;
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &MemoryId, hard: bool) -> Result<()> {
        injected(&self.fail_deletes, "vector", "delete")?;
        self.inner.delete(id, hard).await
    }

    async fn get_by_id(
        &self,
        id: &MemoryId,
        include_deleted: bool,
    ) -> Result<Option<MemoryRecord>> {
        injected(&self.fail_reads, "vector", "get_by_id")?;
        self.inner.get_by_id(id, include_deleted).await
    }

    async fn get_recent(
        &self,
        user_id: Option<&str>,
        query: &RecentQuery,
    ) -> Result<Vec<MemoryRecord>> {
        injected(&self.fail_reads, "vector", "get_recent")?;
        self.inner.get_recent(user_id, query).await
    }

    async fn stats(&self, user_id: Option<&str>) -> Result<VectorStats> {
        injected(&self.fail_reads, "vector", "stats")?;
        self.inner.stats(user_id).await
    }
}

/// In-memory graph store with injectable failures, latency and a
/// configuration switch.
pub(crate) struct FlakyGraphStore {
    inner: SqliteGraphStore,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub configured: AtomicBool,
    /// Fail only `MergeEntityMention`, leaving anchors writable.
    pub fail_mentions: AtomicBool,
    /// Fail only `DeleteAnchor`.
    pub fail_anchor_deletes: AtomicBool,
    delay_ms: AtomicU64,
    writes: AtomicU64,
}

impl FlakyGraphStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteGraphStore::in_memory().unwrap(),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            configured: AtomicBool::new(true),
            fail_mentions: AtomicBool::new(false),
            fail_anchor_deletes: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &SqliteGraphStore {
        &self.inner
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.fail_writes.store(unreachable, Ordering::SeqCst);
        self.fail_reads.store(unreachable, Ordering::SeqCst);
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of mutating queries that reached the inner store.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl GraphStore for FlakyGraphStore {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    async fn verify_connection(&self) -> Result<bool> {
        self.pause().await;
        injected(&self.fail_reads, "graph", "verify_connection")?;
        self.inner.verify_connection().await
    }

    async fn run(&self, query: &GraphQuery) -> Result<()> {
        self.pause().await;
        injected(&self.fail_writes, "graph", query.name())?;
        match query {
            GraphQuery::MergeEntityMention { .. } => {
                injected(&self.fail_mentions, "graph", query.name())?
            }
            GraphQuery::DeleteAnchor { .. } => {
                injected(&self.fail_anchor_deletes, "graph", query.name())?
            }
            _ => {}
        }
        if !query.is_read_only() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.run(query).await
    }

    async fn query(&self, query: &GraphQuery) -> Result<Vec<GraphRow>> {
        self.pause().await;
        injected(&self.fail_reads, "graph", query.name())?;
        self.inner.query(query).await
    }

    async fn clear_all(&self) -> Result<()> {
        injected(&self.fail_writes, "graph", "clear_all")?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_all().await
    }

    async fn create_indexes(&self) -> Result<()> {
        injected(&self.fail_writes, "graph", "create_indexes")?;
        self.inner.create_indexes().await
    }

    async fn stats(&self) -> Result<GraphStats> {
        injected(&self.fail_reads, "graph", "stats")?;
        self.inner.stats().await
    }
}
