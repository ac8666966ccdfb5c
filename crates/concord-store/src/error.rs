//! Store error types.

use thiserror::Error;

use concord_config::ConfigError;
use concord_embed::EmbedError;
use concord_memory::MemoryError;
use concord_types::Id;

/// Errors surfaced by the shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A long-term memory component failed.
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Working memory rejected a write.
    #[error("Session error: {0}")]
    Session(#[from] concord_session::Error),

    /// Configuration could not be loaded or applied.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The embedding provider could not be built.
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// An unregistered agent wrote without naming a domain.
    #[error("Unknown agent '{0}': register it or pass a domain")]
    UnknownAgent(String),

    /// The caller may not act on this object.
    #[error("Agent '{agent_id}' may not modify {id}")]
    AccessDenied { agent_id: String, id: Id },

    /// No object has this id.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// A component failure on behalf of `agent_id`. An ownership clash
    /// becomes [`StoreError::AccessDenied`] for the caller.
    pub(crate) fn for_caller(agent_id: &str, err: MemoryError) -> Self {
        match err {
            MemoryError::NotOwner { id, .. } => Self::AccessDenied {
                agent_id: agent_id.to_string(),
                id,
            },
            other => Self::Memory(other),
        }
    }

    /// Whether the failure came from the index or embedding backend.
    pub fn is_backend_unavailable(&self) -> bool {
        match self {
            Self::Memory(e) => e.is_backend_unavailable(),
            Self::Embedding(_) => true,
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
