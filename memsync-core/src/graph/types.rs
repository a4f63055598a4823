//! Graph projection types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::memory::{MemoryId, MemoryRecord};

/// Label of the node that anchors a memory record in the graph.
pub const MEMORY_LABEL: &str = "Memory";
/// Label of entity nodes.
pub const ENTITY_LABEL: &str = "Entity";
/// Relationship type from an entity to the memory that mentions it.
pub const MENTIONED_IN: &str = "MENTIONED_IN";

/// A row returned by a graph read, keyed by column alias.
pub type GraphRow = serde_json::Map<String, Value>;

/// The graph node representing a memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorNode {
    pub memory_id: MemoryId,
    pub user_id: String,
    pub content: String,
    /// Creation time of the vector record, not of the node.
    pub created_at: DateTime<Utc>,
    /// Set when the node was recreated by a repair or rebuild.
    #[serde(default)]
    pub repaired_at: Option<DateTime<Utc>>,
}

impl AnchorNode {
    /// Anchor for a record written through the coordinator.
    pub fn from_record(record: &MemoryRecord) -> Self {
        Self {
            memory_id: record.id,
            user_id: record.user_id.clone(),
            content: record.content.clone(),
            created_at: record.created_at,
            repaired_at: None,
        }
    }

    /// Minimal anchor recreated from the source of truth.
    pub fn repaired(record: &MemoryRecord) -> Self {
        Self {
            repaired_at: Some(Utc::now()),
            ..Self::from_record(record)
        }
    }
}

/// An entity relationship as read back from the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub key: String,
    pub entity_type: String,
    pub value: String,
    pub normalized: String,
    pub confidence: f64,
    pub source: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// Node and relationship counts reported by a graph store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes_by_type: HashMap<String, u64>,
    pub relationships_by_type: HashMap<String, u64>,
}

impl GraphStats {
    /// Number of memory anchor nodes.
    pub fn anchor_count(&self) -> u64 {
        self.nodes_by_type.get(MEMORY_LABEL).copied().unwrap_or(0)
    }

    pub fn entity_count(&self) -> u64 {
        self.nodes_by_type.get(ENTITY_LABEL).copied().unwrap_or(0)
    }

    /// Number of entity-to-memory relationships.
    pub fn mention_count(&self) -> u64 {
        self.relationships_by_type
            .get(MENTIONED_IN)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_nodes(&self) -> u64 {
        self.nodes_by_type.values().sum()
    }

    pub fn total_relationships(&self) -> u64 {
        self.relationships_by_type.values().sum()
    }
}
