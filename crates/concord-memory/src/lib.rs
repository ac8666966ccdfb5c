//! Long-term memory for Concord.
//!
//! Three stores share one [`VectorIndex`] and one embedder:
//! - [`EpisodicMemory`]: timestamped interactions with importance decay
//! - [`SemanticMemory`]: facts, preferences, entity profiles and contacts
//! - [`ProceduralMemory`]: trigger→action patterns with learned confidence
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌────────────────┐
//! │ Episodic     │  │ Semantic     │  │ Procedural     │
//! │ decay, time  │  │ facts, prefs │  │ confidence,    │
//! │ range, recent│  │ entities     │  │ keyword match  │
//! └──────┬───────┘  └──────┬───────┘  └───────┬────────┘
//!        └─────────────────┼──────────────────┘
//!                  ┌───────┴────────┐
//!                  │  VectorIndex   │  SqliteIndex (sqlite-vec)
//!                  │  + Embedder    │  InMemoryIndex
//!                  └────────────────┘
//! ```
//!
//! Reads are soft: a failing index or embedder is logged and yields an empty
//! result. Writes return the error.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use concord_embed::HashEmbedder;
//! use concord_memory::{EpisodicMemory, Interaction, RecordQuery, SqliteIndex};
//! use concord_types::MemoryDomain;
//!
//! # async fn demo() -> concord_memory::Result<()> {
//! let index = Arc::new(SqliteIndex::open("concord.db")?);
//! let embedder = Arc::new(HashEmbedder::new(384));
//! let episodic = EpisodicMemory::new(index, embedder)?;
//!
//! episodic
//!     .add_interaction(Interaction::new("Client asked for the Q3 deck", "email_agent", MemoryDomain::Email))
//!     .await?;
//! let hits = episodic
//!     .search("Q3 deck", 5, &RecordQuery::new().for_agent("email_agent"))
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod episodic;
pub mod error;
pub mod filter;
pub mod index;
pub mod procedural;
pub mod query;
pub mod records;
pub mod semantic;
pub mod validation;

pub use episodic::{DecayConfig, DecayReport, EpisodicMemory, Interaction};
pub use error::{MemoryError, Result};
pub use filter::{Condition, Filter, Range};
pub use index::{
    ENTITY_COLLECTION, EPISODIC_COLLECTION, InMemoryIndex, PROCEDURE_COLLECTION, Point,
    SEMANTIC_COLLECTION, ScoredPoint, SharedIndex, SqliteIndex, VectorIndex,
    init_vector_extension,
};
pub use procedural::{
    ProceduralConfig, ProceduralMemory, ProcedureMatch, ProcedurePatch, ProcedureQuery,
};
pub use query::RecordQuery;
pub use records::RecordPatch;
pub use semantic::{PREFERENCE_PREFIX, SemanticMemory, is_contact};
pub use validation::ValidationError;

#[cfg(any(test, feature = "testing"))]
pub use index::FailingIndex;
