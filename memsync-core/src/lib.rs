//! # memsync-core
//!
//! Dual-write persistence of user memories across a vector store (the
//! source of truth) and a graph store (a derived entity index), with
//! out-of-band drift detection and repair.
//!
//! ## Core Components
//!
//! - **Memory**: Memory records and the [`VectorStore`] that owns them
//! - **Graph**: Anchor nodes, entity relationships and the [`GraphStore`]
//! - **Persistence**: The [`PersistenceCoordinator`] for store/update/delete and health
//! - **Sync**: The [`SyncService`] for consistency checks, repair and rebuild
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use memsync_core::{
//!     Entity, PersistenceConfig, PersistenceCoordinator, SqliteGraphStore, SqliteVectorStore,
//!     StoreRequest, SyncService, FullSyncOptions,
//! };
//!
//! let vector = Arc::new(SqliteVectorStore::open("memories.db")?);
//! let graph = Arc::new(SqliteGraphStore::open("graph.db")?);
//!
//! let coordinator = PersistenceCoordinator::new(
//!     PersistenceConfig::from_env(),
//!     vector.clone(),
//!     graph.clone(),
//! );
//! let result = coordinator
//!     .store(StoreRequest::new("alice", "Lunch with Ada").with_entities(vec![
//!         Entity::new("person", "Ada"),
//!     ]))
//!     .await?;
//!
//! let sync = SyncService::new(vector, graph);
//! let repaired = sync.full_sync(FullSyncOptions::new()).await?;
//! ```

pub mod config;
mod deadline;
pub mod error;
pub mod extract;
pub mod graph;
pub mod inconsistency;
pub mod memory;
pub mod persistence;
pub mod sync;
#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config::{PersistenceConfig, SyncConfig};
pub use error::{Error, Result};
pub use extract::EntityExtractor;
pub use graph::{AnchorNode, GraphQuery, GraphStats, GraphStore, SqliteGraphStore};
pub use inconsistency::{
    Inconsistency, InconsistencyKind, InconsistencySink, RecordingSink, TracingSink,
};
pub use memory::{
    Entity, MemoryId, MemoryPatch, MemoryRecord, NewMemory, Patch, RecentQuery,
    SqliteVectorStore, VectorStats, VectorStore,
};
pub use persistence::{
    DeleteRequest, HealthCheck, HealthStatus, Outcome, PersistenceCoordinator,
    PersistenceResult, StoreRequest, UpdateRequest,
};
pub use sync::{
    ConsistencyReport, FullSyncOptions, RebuildOptions, SyncResult, SyncService, SyncStats,
};
