//! Vector index abstraction.
//!
//! The memory components talk to a [`VectorIndex`]: named collections of
//! points, each a vector plus a JSON payload, queried by cosine similarity
//! under a payload [`Filter`].
//!
//! - [`SqliteIndex`]: persistent, backed by SQLite and sqlite-vec
//! - [`InMemoryIndex`]: process-local, brute-force cosine

mod memory;
mod sqlite;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use concord_types::Id;

use crate::error::{MemoryError, Result};
use crate::filter::Filter;

pub use memory::InMemoryIndex;
pub use sqlite::{SqliteIndex, init_vector_extension};

/// Collection holding episodic records.
pub const EPISODIC_COLLECTION: &str = "episodic";
/// Collection holding facts and preferences.
pub const SEMANTIC_COLLECTION: &str = "semantic";
/// Collection holding entity profiles.
pub const ENTITY_COLLECTION: &str = "entities";
/// Collection holding procedures.
pub const PROCEDURE_COLLECTION: &str = "procedures";

/// A stored vector with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: Id,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

impl Point {
    pub fn new(id: Id, vector: Vec<f32>, payload: Map<String, Value>) -> Self {
        Self {
            id,
            vector,
            payload,
        }
    }
}

/// A query hit. Higher `score` is more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: Id,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// Storage and filtered nearest-neighbour search over points.
///
/// Every call is blocking from the caller's point of view.
pub trait VectorIndex: Send + Sync {
    /// Create `collection` with a fixed width if it does not exist.
    ///
    /// Fails when the collection exists with a different width.
    fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()>;

    /// Insert or replace a point.
    fn upsert(&self, collection: &str, point: Point) -> Result<()>;

    /// Up to `limit` points matching `filter`, most similar to `vector` first.
    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// Up to `limit` points matching `filter`, in insertion order.
    fn scroll(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Point>>;

    /// Points with the given ids; missing ids are skipped.
    fn retrieve(&self, collection: &str, ids: &[Id]) -> Result<Vec<Point>>;

    /// Overwrite the top-level payload keys present in `patch`.
    ///
    /// Returns `false` when the point does not exist.
    fn set_payload(&self, collection: &str, id: Id, patch: Map<String, Value>) -> Result<bool>;

    /// Delete points; returns how many existed.
    fn delete(&self, collection: &str, ids: &[Id]) -> Result<usize>;

    fn count(&self, collection: &str, filter: &Filter) -> Result<usize>;

    fn name(&self) -> &str;
}

/// A shared index that can be used across threads.
pub type SharedIndex = Arc<dyn VectorIndex>;

/// Serialize a record into a point payload.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(MemoryError::InvalidData(format!(
            "payload must be an object, got {other}"
        ))),
    }
}

/// Decode a point payload back into a record.
pub fn from_payload<T: DeserializeOwned>(payload: Map<String, Value>) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(payload))?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Failing Index (test double)
// ─────────────────────────────────────────────────────────────────────────────

/// Index whose every call fails, for exercising backend-outage paths.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default, Clone)]
pub struct FailingIndex;

#[cfg(any(test, feature = "testing"))]
impl FailingIndex {
    fn down<T>() -> Result<T> {
        Err(MemoryError::BackendUnavailable(
            "vector index unreachable".to_string(),
        ))
    }
}

#[cfg(any(test, feature = "testing"))]
impl VectorIndex for FailingIndex {
    fn ensure_collection(&self, _collection: &str, _dimensions: usize) -> Result<()> {
        // Construction succeeds so the outage shows up on use.
        Ok(())
    }

    fn upsert(&self, _collection: &str, _point: Point) -> Result<()> {
        Self::down()
    }

    fn query(
        &self,
        _collection: &str,
        _vector: &[f32],
        _filter: &Filter,
        _limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        Self::down()
    }

    fn scroll(&self, _collection: &str, _filter: &Filter, _limit: usize) -> Result<Vec<Point>> {
        Self::down()
    }

    fn retrieve(&self, _collection: &str, _ids: &[Id]) -> Result<Vec<Point>> {
        Self::down()
    }

    fn set_payload(&self, _collection: &str, _id: Id, _patch: Map<String, Value>) -> Result<bool> {
        Self::down()
    }

    fn delete(&self, _collection: &str, _ids: &[Id]) -> Result<usize> {
        Self::down()
    }

    fn count(&self, _collection: &str, _filter: &Filter) -> Result<usize> {
        Self::down()
    }

    fn name(&self) -> &str {
        "failing"
    }
}
