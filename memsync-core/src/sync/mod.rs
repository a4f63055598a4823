//! Drift detection and repair between the vector store and the graph.
//!
//! The vector store is the source of truth, so every job enumerates vector
//! records and checks or recreates their anchor nodes:
//!
//! - [`SyncService::check_consistency`]: find records without an anchor
//! - [`SyncService::repair_inconsistencies`]: restore anchors (no entity edges)
//! - [`SyncService::full_sync`]: check, then repair unless `dry_run`
//! - [`SyncService::rebuild_graph`]: recreate anchors, optionally from an empty graph
//! - [`SyncService::get_stats`]: raw counts and sync percentage
//!
//! ## Example
//!
//! ```rust,ignore
//! use memsync_core::sync::{FullSyncOptions, SyncService};
//!
//! let sync = SyncService::new(vector, graph);
//! let result = sync.full_sync(FullSyncOptions::new().for_user("alice")).await?;
//! println!("repaired {} of {}", result.repaired, result.inconsistency_count());
//! ```

mod service;
mod types;

pub use service::SyncService;
pub use types::{ConsistencyReport, FullSyncOptions, RebuildOptions, SyncResult, SyncStats};
