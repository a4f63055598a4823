//! Memory record types shared by the vector store, coordinator and sync service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Lowest accepted importance.
pub const MIN_IMPORTANCE: u8 = 1;
/// Highest accepted importance.
pub const MAX_IMPORTANCE: u8 = 10;
/// Importance assigned when the caller gives none.
pub const DEFAULT_IMPORTANCE: u8 = 5;

/// Unique identifier for a memory record.
///
/// Assigned by the vector store on insert and reused as the graph anchor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Generate a new random memory ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A memory record as persisted in the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub user_id: String,
    pub content: String,
    /// May be empty when the embedding is computed later.
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub conversation_id: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// 1-10.
    pub importance: u8,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// Fields for inserting a new record. The store assigns id and timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub conversation_id: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub importance: Option<u8>,
}

impl NewMemory {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Importance clamped to 1-10, defaulting to 5.
    pub fn effective_importance(&self) -> u8 {
        clamp_importance(self.importance.unwrap_or(DEFAULT_IMPORTANCE))
    }
}

/// Clamp an importance value into the accepted range.
pub fn clamp_importance(importance: u8) -> u8 {
    importance.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE)
}

/// Tri-state field update: leave alone, clear, or set.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Unchanged,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::Unchanged
    }
}

impl<T> Patch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    /// Apply to an optional field in place.
    pub fn apply_to(self, target: &mut Option<T>) {
        match self {
            Self::Unchanged => {}
            Self::Clear => *target = None,
            Self::Set(value) => *target = Some(value),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `Some` sets, `None` clears.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Clear,
        }
    }
}

/// Partial update of a memory record. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub conversation_id: Patch<String>,
    pub summary: Patch<String>,
    /// Replaces the whole metadata map.
    pub metadata: Option<HashMap<String, Value>>,
    pub importance: Option<u8>,
}

impl MemoryPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn conversation_id(mut self, patch: Patch<String>) -> Self {
        self.conversation_id = patch;
        self
    }

    pub fn summary(mut self, patch: Patch<String>) -> Self {
        self.summary = patch;
        self
    }

    pub fn metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn importance(mut self, importance: u8) -> Self {
        self.importance = Some(importance);
        self
    }

    /// True when applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.embedding.is_none()
            && self.conversation_id.is_unchanged()
            && self.summary.is_unchanged()
            && self.metadata.is_none()
            && self.importance.is_none()
    }

    /// Apply the patch to a record, bumping `updated_at`.
    pub fn apply(self, record: &mut MemoryRecord) {
        if let Some(content) = self.content {
            record.content = content;
        }
        if let Some(embedding) = self.embedding {
            record.embedding = embedding;
        }
        self.conversation_id.apply_to(&mut record.conversation_id);
        self.summary.apply_to(&mut record.summary);
        if let Some(metadata) = self.metadata {
            record.metadata = metadata;
        }
        if let Some(importance) = self.importance {
            record.importance = clamp_importance(importance);
        }
        record.updated_at = Utc::now();
    }
}

/// Options for listing recent records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentQuery {
    pub limit: usize,
    pub conversation_id: Option<String>,
    pub exclude_deleted: bool,
}

impl RecentQuery {
    /// Most recent `limit` live records.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            conversation_id: None,
            exclude_deleted: true,
        }
    }

    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.exclude_deleted = false;
        self
    }
}

/// Record counts reported by a vector store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStats {
    /// Live (not soft-deleted) records.
    pub total: u64,
    /// Soft-deleted records.
    pub deleted: u64,
    /// Live records that still lack an embedding.
    pub without_embedding: u64,
    pub distinct_users: u64,
}

/// An entity extracted from memory content.
///
/// Entities are inputs to a store/update call; they only persist as graph
/// nodes and relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Category tag, e.g. `person` or `topic`.
    pub entity_type: String,
    /// Raw extracted string.
    pub value: String,
    /// Canonical merge key.
    pub normalized: String,
    /// 0.0-1.0.
    pub confidence: f64,
    pub source: String,
    pub context: Option<String>,
}

impl Entity {
    /// Create an entity whose normalized key is the trimmed, lowercased value.
    pub fn new(entity_type: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            entity_type: entity_type.into(),
            normalized: normalize(&value),
            value,
            confidence: 1.0,
            source: "caller".to_string(),
            context: None,
        }
    }

    pub fn with_normalized(mut self, normalized: impl Into<String>) -> Self {
        self.normalized = normalized.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Graph key of the entity node: `type:normalized`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.entity_type, self.normalized)
    }
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
