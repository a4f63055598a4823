//! Named, parameterized graph queries.
//!
//! The coordinator and sync service never build query text. They construct a
//! [`GraphQuery`] value and the store decides how to execute it. Stores that
//! talk to a Cypher engine can send [`GraphQuery::cypher`] together with
//! [`GraphQuery::params`]; every value travels as a bound parameter.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::AnchorNode;
use crate::memory::{Entity, MemoryId};

/// A typed query parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GraphParam {
    String(String),
    Float(f64),
    Int(i64),
    Timestamp(DateTime<Utc>),
    Null,
}

impl From<&str> for GraphParam {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for GraphParam {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for GraphParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<DateTime<Utc>> for GraphParam {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<GraphParam>> From<Option<T>> for GraphParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Every graph operation the crate issues.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphQuery {
    /// Create the anchor node or refresh its properties.
    MergeAnchor { anchor: AnchorNode },
    /// Create the anchor node only if it does not exist yet.
    EnsureAnchor { anchor: AnchorNode },
    /// Merge an entity node and its `MENTIONED_IN` edge to an existing anchor.
    MergeEntityMention { memory_id: MemoryId, entity: Entity },
    /// Remove every `MENTIONED_IN` edge pointing at the anchor.
    RemoveMentions { memory_id: MemoryId },
    /// Remove the anchor and every relationship touching it.
    DeleteAnchor { memory_id: MemoryId },
    /// Read the anchor node (zero or one row of [`AnchorNode`]).
    FindAnchor { memory_id: MemoryId },
    /// Read the entities mentioned by a memory (rows of [`Mention`](super::Mention)).
    FindMentions { memory_id: MemoryId },
    /// One row with a `count` column.
    CountAnchors,
}

impl GraphQuery {
    /// Stable name, used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MergeAnchor { .. } => "merge_anchor",
            Self::EnsureAnchor { .. } => "ensure_anchor",
            Self::MergeEntityMention { .. } => "merge_entity_mention",
            Self::RemoveMentions { .. } => "remove_mentions",
            Self::DeleteAnchor { .. } => "delete_anchor",
            Self::FindAnchor { .. } => "find_anchor",
            Self::FindMentions { .. } => "find_mentions",
            Self::CountAnchors => "count_anchors",
        }
    }

    /// Whether the query only reads.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::FindAnchor { .. } | Self::FindMentions { .. } | Self::CountAnchors
        )
    }

    /// The memory this query targets, if any.
    pub fn memory_id(&self) -> Option<MemoryId> {
        match self {
            Self::MergeAnchor { anchor } | Self::EnsureAnchor { anchor } => Some(anchor.memory_id),
            Self::MergeEntityMention { memory_id, .. }
            | Self::RemoveMentions { memory_id }
            | Self::DeleteAnchor { memory_id }
            | Self::FindAnchor { memory_id }
            | Self::FindMentions { memory_id } => Some(*memory_id),
            Self::CountAnchors => None,
        }
    }

    /// Cypher text for this query. Values are referenced as `$name` and
    /// supplied by [`params`](Self::params).
    pub fn cypher(&self) -> &'static str {
        match self {
            Self::MergeAnchor { .. } => {
                "MERGE (m:Memory {id: $memory_id}) \
                 SET m.user_id = $user_id, m.content = $content, m.created_at = $created_at"
            }
            Self::EnsureAnchor { .. } => {
                "MERGE (m:Memory {id: $memory_id}) \
                 ON CREATE SET m.user_id = $user_id, m.content = $content, \
                 m.created_at = $created_at, m.repaired_at = $repaired_at"
            }
            Self::MergeEntityMention { .. } => {
                "MATCH (m:Memory {id: $memory_id}) \
                 MERGE (e:Entity {key: $key}) \
                 ON CREATE SET e.entity_type = $entity_type, e.value = $value, \
                 e.normalized = $normalized \
                 MERGE (e)-[r:MENTIONED_IN]->(m) \
                 SET r.confidence = $confidence, r.source = $source, r.context = $context"
            }
            Self::RemoveMentions { .. } => {
                "MATCH (:Entity)-[r:MENTIONED_IN]->(m:Memory {id: $memory_id}) DELETE r"
            }
            Self::DeleteAnchor { .. } => "MATCH (m:Memory {id: $memory_id}) DETACH DELETE m",
            Self::FindAnchor { .. } => {
                "MATCH (m:Memory {id: $memory_id}) \
                 RETURN m.id AS memory_id, m.user_id AS user_id, m.content AS content, \
                 m.created_at AS created_at, m.repaired_at AS repaired_at"
            }
            Self::FindMentions { .. } => {
                "MATCH (e:Entity)-[r:MENTIONED_IN]->(m:Memory {id: $memory_id}) \
                 RETURN e.key AS key, e.entity_type AS entity_type, e.value AS value, \
                 e.normalized AS normalized, r.confidence AS confidence, \
                 r.source AS source, r.context AS context"
            }
            Self::CountAnchors => "MATCH (m:Memory) RETURN count(m) AS count",
        }
    }

    /// Bound parameters for [`cypher`](Self::cypher).
    pub fn params(&self) -> Vec<(&'static str, GraphParam)> {
        match self {
            Self::MergeAnchor { anchor } => vec![
                ("memory_id", anchor.memory_id.to_string().into()),
                ("user_id", anchor.user_id.clone().into()),
                ("content", anchor.content.clone().into()),
                ("created_at", anchor.created_at.into()),
            ],
            Self::EnsureAnchor { anchor } => vec![
                ("memory_id", anchor.memory_id.to_string().into()),
                ("user_id", anchor.user_id.clone().into()),
                ("content", anchor.content.clone().into()),
                ("created_at", anchor.created_at.into()),
                ("repaired_at", anchor.repaired_at.into()),
            ],
            Self::MergeEntityMention { memory_id, entity } => vec![
                ("memory_id", memory_id.to_string().into()),
                ("key", entity.key().into()),
                ("entity_type", entity.entity_type.clone().into()),
                ("value", entity.value.clone().into()),
                ("normalized", entity.normalized.clone().into()),
                ("confidence", entity.confidence.into()),
                ("source", entity.source.clone().into()),
                ("context", entity.context.clone().into()),
            ],
            Self::RemoveMentions { memory_id }
            | Self::DeleteAnchor { memory_id }
            | Self::FindAnchor { memory_id }
            | Self::FindMentions { memory_id } => {
                vec![("memory_id", memory_id.to_string().into())]
            }
            Self::CountAnchors => Vec::new(),
        }
    }
}

impl std::fmt::Display for GraphQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.memory_id() {
            Some(id) => write!(f, "{}({})", self.name(), id),
            None => write!(f, "{}", self.name()),
        }
    }
}
