//! Error types for the memory crate.

use thiserror::Error;

use concord_embed::EmbedError;
use concord_types::Id;

/// Errors that can occur in the memory crate.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The vector index could not serve the request.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The embedding provider failed.
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// An object with this id already belongs to another agent.
    #[error("{id} is owned by '{owner}'")]
    NotOwner { id: Id, owner: String },

    /// Invalid query or parameters.
    #[error("Query error: {0}")]
    Query(String),
}

impl MemoryError {
    /// Whether this failure came from the index or the embedding provider
    /// rather than from the caller's input.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::Database(_) | Self::Embedding(_)
        )
    }
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_classification() {
        assert!(MemoryError::BackendUnavailable("down".into()).is_backend_unavailable());
        assert!(
            MemoryError::Embedding(EmbedError::Network("refused".into())).is_backend_unavailable()
        );
        assert!(!MemoryError::NotFound("x".into()).is_backend_unavailable());
        assert!(!MemoryError::InvalidData("x".into()).is_backend_unavailable());
    }
}
