//! Dual-write persistence across the vector store and the graph projection.
//!
//! The vector store write is the critical path. Graph writes are best
//! effort: a failure leaves the record stored, is reported to the
//! [`InconsistencySink`](crate::inconsistency::InconsistencySink), and shows
//! up in the result as [`Outcome::Recovered`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use memsync_core::persistence::{PersistenceCoordinator, StoreRequest};
//!
//! let coordinator = PersistenceCoordinator::new(config, vector, graph);
//! let result = coordinator
//!     .store(StoreRequest::new("alice", "Met Ada at the museum").with_entities(entities))
//!     .await?;
//!
//! if !result.is_consistent() {
//!     // the record is stored; the graph will be repaired by a sync run
//! }
//! ```

mod coordinator;
mod types;

pub use coordinator::PersistenceCoordinator;
pub use types::{
    sync_percentage, DeleteRequest, HealthCheck, HealthMetrics, HealthStatus, Outcome,
    PersistenceMetadata, PersistenceResult, StoreHealth, StoreRequest, UpdateRequest,
};
