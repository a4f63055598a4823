//! Error types for memsync-core.

use thiserror::Error;

/// Result type alias using memsync-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during persistence and sync operations.
///
/// The store variants carry the operation that failed so the coordinator can
/// decide, per store, whether a failure is fatal or tolerable.
#[derive(Error, Debug)]
pub enum Error {
    /// Failure reading or writing the vector store (source of truth).
    #[error("Vector store error during {operation}: {message}")]
    VectorStore { operation: String, message: String },

    /// Failure reading or writing the graph store (derived index).
    #[error("Graph store error during {operation}: {message}")]
    GraphStore { operation: String, message: String },

    /// Failure scanning or repairing a single record.
    #[error("Sync error for memory {memory_id}: {message}")]
    Sync { memory_id: String, message: String },

    /// Timeout during a store call
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Record not found
    #[error("Memory not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a vector store error.
    pub fn vector_store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VectorStore {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a graph store error.
    pub fn graph_store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GraphStore {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a sync error for one record.
    pub fn sync(memory_id: impl ToString, message: impl Into<String>) -> Self {
        Self::Sync {
            memory_id: memory_id.to_string(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Re-tag any error as a vector store failure. Already-tagged vector
    /// errors pass through unchanged.
    pub fn into_vector(self, operation: &str) -> Self {
        match self {
            e @ Self::VectorStore { .. } => e,
            other => Self::vector_store(operation, other.to_string()),
        }
    }

    /// Re-tag any error as a graph store failure.
    pub fn into_graph(self, operation: &str) -> Self {
        match self {
            e @ Self::GraphStore { .. } => e,
            other => Self::graph_store(operation, other.to_string()),
        }
    }

    /// Whether this error came from the vector store.
    pub fn is_vector_store(&self) -> bool {
        matches!(self, Self::VectorStore { .. })
    }

    /// Whether this error came from the graph store.
    pub fn is_graph_store(&self) -> bool {
        matches!(self, Self::GraphStore { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retag_preserves_store_variant() {
        let err = Error::vector_store("insert", "disk full").into_vector("store");
        assert!(err.is_vector_store());
        assert!(err.to_string().contains("during insert"));

        let err = Error::timeout(50).into_graph("merge_anchor");
        assert!(err.is_graph_store());
        assert!(err.to_string().contains("timed out after 50ms"));
    }
}
