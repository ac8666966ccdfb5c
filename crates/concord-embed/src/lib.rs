//! Text embedding for the Concord memory store.
//!
//! The memory components only need "text in, fixed-width vector out"; this
//! crate provides the [`Embedder`] trait and two providers behind it.

pub mod embeddings;
pub mod error;

pub use embeddings::{
    DEFAULT_DIMENSIONS, Embedder, EmbedderSpec, HashEmbedder, OpenAiEmbedder,
    OpenAiEmbedderConfig, SharedEmbedder, build_embedder, cosine_similarity, is_zero_vector,
};
#[cfg(any(test, feature = "testing"))]
pub use embeddings::FailingEmbedder;
pub use error::{EmbedError, Result};
