//! Error types for working memory operations.

/// Error type for working memory operations.
///
/// Reads never fail; they fall back to defaults. Only writes with an
/// unusable session id or key are rejected.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session id was empty.
    #[error("Invalid session id: {0:?}")]
    InvalidSession(String),

    /// Slot key was empty.
    #[error("Invalid slot key: {0:?}")]
    InvalidKey(String),

    /// A helper value could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for working memory operations.
pub type Result<T> = std::result::Result<T, Error>;
