//! Memory records and the vector store that owns them.
//!
//! The vector store is the source of truth: a memory exists if and only if
//! the vector store has it. Everything else (the graph projection, sync
//! reports) is derived from these records.
//!
//! ## Example
//!
//! ```rust,ignore
//! use memsync_core::memory::{NewMemory, RecentQuery, SqliteVectorStore, VectorStore};
//!
//! let store = SqliteVectorStore::in_memory()?;
//!
//! let record = store.insert(NewMemory::new("alice", "Prefers tea")).await?;
//! let recent = store.get_recent(Some("alice"), &RecentQuery::new(10)).await?;
//! ```

mod schema;
mod store;
mod types;

pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use store::{SqliteVectorStore, VectorStore};
pub(crate) use store::format_datetime;
pub use types::{
    clamp_importance, Entity, MemoryId, MemoryPatch, MemoryRecord, NewMemory, Patch, RecentQuery,
    VectorStats, DEFAULT_IMPORTANCE, MAX_IMPORTANCE, MIN_IMPORTANCE,
};
