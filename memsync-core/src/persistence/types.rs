//! Request, result and health types for the persistence coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

use crate::error::Error;
use crate::memory::{Entity, MemoryId, MemoryPatch, NewMemory};

/// Request to store a new memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreRequest {
    pub user_id: String,
    pub content: String,
    /// `None` stores the record with an empty embedding.
    pub embedding: Option<Vec<f32>>,
    pub conversation_id: Option<String>,
    pub summary: Option<String>,
    pub metadata: Option<HashMap<String, Value>>,
    pub importance: Option<u8>,
    /// Entities extracted by the caller; empty means no entity graph work.
    pub entities: Vec<Entity>,
}

impl StoreRequest {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    /// Split into the vector-store insert and the entities for the graph.
    pub(crate) fn into_parts(self) -> (NewMemory, Vec<Entity>) {
        let memory = NewMemory {
            user_id: self.user_id,
            content: self.content,
            embedding: self.embedding.unwrap_or_default(),
            conversation_id: self.conversation_id,
            summary: self.summary,
            metadata: self.metadata.unwrap_or_default(),
            importance: self.importance,
        };
        (memory, self.entities)
    }
}

/// Request to update an existing memory.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub id: MemoryId,
    pub patch: MemoryPatch,
    /// `Some` replaces every entity relationship of the record, `None`
    /// leaves them alone.
    pub entities: Option<Vec<Entity>>,
}

impl UpdateRequest {
    pub fn new(id: MemoryId, patch: MemoryPatch) -> Self {
        Self {
            id,
            patch,
            entities: None,
        }
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = Some(entities);
        self
    }
}

/// Request to delete a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRequest {
    pub id: MemoryId,
    /// Remove the row instead of flagging it deleted.
    pub hard: bool,
    /// Also remove the anchor node and its relationships.
    pub cascade_graph: bool,
}

impl DeleteRequest {
    /// Soft delete with graph cascade.
    pub fn new(id: MemoryId) -> Self {
        Self {
            id,
            hard: false,
            cascade_graph: true,
        }
    }

    pub fn hard(mut self) -> Self {
        self.hard = true;
        self
    }

    pub fn without_cascade(mut self) -> Self {
        self.cascade_graph = false;
        self
    }
}

/// Per-store status of one coordinator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceMetadata {
    pub vector_write_success: bool,
    pub graph_write_success: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PersistenceMetadata {
    pub(crate) fn finish(started: Instant, vector_ok: bool, graph_ok: bool) -> Self {
        Self {
            vector_write_success: vector_ok,
            graph_write_success: graph_ok,
            timestamp: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// How a coordinator call ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every attempted write succeeded.
    Ok,
    /// The vector write stands; a graph write failed and was recorded as an
    /// inconsistency.
    Recovered(Error),
    /// The operation failed.
    Fatal(Error),
}

/// Result of every coordinator operation. `metadata` is always populated,
/// even when the call failed outright.
#[derive(Debug)]
pub struct PersistenceResult<T> {
    pub data: Option<T>,
    pub outcome: Outcome,
    pub metadata: PersistenceMetadata,
}

impl<T> PersistenceResult<T> {
    pub(crate) fn ok(data: T, metadata: PersistenceMetadata) -> Self {
        Self {
            data: Some(data),
            outcome: Outcome::Ok,
            metadata,
        }
    }

    pub(crate) fn recovered(data: T, error: Error, metadata: PersistenceMetadata) -> Self {
        Self {
            data: Some(data),
            outcome: Outcome::Recovered(error),
            metadata,
        }
    }

    pub(crate) fn fatal(error: Error, metadata: PersistenceMetadata) -> Self {
        Self {
            data: None,
            outcome: Outcome::Fatal(error),
            metadata,
        }
    }

    /// Whether the operation succeeded against the source of truth.
    pub fn success(&self) -> bool {
        !matches!(self.outcome, Outcome::Fatal(_))
    }

    /// The fatal error, or the recovered graph error kept for visibility.
    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            Outcome::Ok => None,
            Outcome::Recovered(e) | Outcome::Fatal(e) => Some(e),
        }
    }

    /// Both stores were written (or the graph was intentionally skipped).
    pub fn is_consistent(&self) -> bool {
        matches!(self.outcome, Outcome::Ok)
    }

    /// Convert into a plain `Result`, treating recovered failures as success.
    pub fn into_result(self) -> crate::error::Result<Option<T>> {
        match self.outcome {
            Outcome::Fatal(e) => Err(e),
            Outcome::Ok | Outcome::Recovered(_) => Ok(self.data),
        }
    }
}

/// Overall health of the two stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy only when both are, unhealthy only when neither is.
    pub fn from_stores(vector_healthy: bool, graph_healthy: bool) -> Self {
        match (vector_healthy, graph_healthy) {
            (true, true) => Self::Healthy,
            (false, false) => Self::Unhealthy,
            _ => Self::Degraded,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Probe result for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub available: bool,
    pub healthy: bool,
    pub last_check: DateTime<Utc>,
    pub error: Option<String>,
}

impl StoreHealth {
    pub(crate) fn up() -> Self {
        Self {
            available: true,
            healthy: true,
            last_check: Utc::now(),
            error: None,
        }
    }

    pub(crate) fn down(available: bool, error: impl Into<String>) -> Self {
        Self {
            available,
            healthy: false,
            last_check: Utc::now(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub total_memories: u64,
    pub vector_store_count: u64,
    pub graph_store_count: u64,
    /// 0-100.
    pub sync_percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub vector_store: StoreHealth,
    pub graph_store: StoreHealth,
    pub metrics: HealthMetrics,
}

/// Coarse agreement between the stores:
/// `round(min(vector, graph) / total * 100)`, or 100 for an empty store.
pub fn sync_percentage(total: u64, vector_count: u64, graph_count: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let agreed = vector_count.min(graph_count) as f64;
    let pct = (agreed / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
