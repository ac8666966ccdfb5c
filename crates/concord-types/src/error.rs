//! Error types for tag parsing.

use thiserror::Error;

/// A string did not name a known memory type, scope or domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseTagError {
    /// Which tag family was being parsed ("memory type", "scope", ...).
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseTagError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
