//! Error types for embedding providers.

/// Error type for embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Provider misconfigured (missing key, unknown provider, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure talking to the provider.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with an error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Response could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The provider returned vectors of the wrong width.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

impl From<reqwest::Error> for EmbedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmbedError::Network(format!("Request timed out: {}", err))
        } else if err.is_decode() {
            EmbedError::Serialization(err.to_string())
        } else {
            EmbedError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EmbedError {
    fn from(err: serde_json::Error) -> Self {
        EmbedError::Serialization(err.to_string())
    }
}
