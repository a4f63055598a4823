//! Graph projection of memory records.
//!
//! Each memory record has one anchor node (label `Memory`, id = memory id).
//! Entities extracted from its content become `Entity` nodes connected to
//! the anchor by `MENTIONED_IN` relationships:
//!
//! ```text
//! (:Entity {key: "person:ada"}) -[:MENTIONED_IN]-> (:Memory {id})
//! ```
//!
//! The graph is derived from the vector store and may lag behind it; the
//! [`sync`](crate::sync) module detects and repairs the difference.

mod query;
mod store;
mod types;

pub use query::{GraphParam, GraphQuery};
pub use store::{decode_rows, find_anchor, GraphStore, SqliteGraphStore};
pub use types::{
    AnchorNode, GraphRow, GraphStats, Mention, ENTITY_LABEL, MEMORY_LABEL, MENTIONED_IN,
};
