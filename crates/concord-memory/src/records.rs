//! Record storage shared by the episodic and semantic stores.

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use concord_embed::SharedEmbedder;
use concord_types::{Id, MemoryDomain, MemoryRecord, MemoryScope, MemoryType};

use crate::error::Result;
use crate::index::{Point, SharedIndex, from_payload, to_payload};
use crate::query::RecordQuery;
use crate::validation::validate_record;

/// Fields to change on an existing record. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub content: Option<String>,
    pub importance: Option<f32>,
    pub scope: Option<MemoryScope>,
    pub domain: Option<MemoryDomain>,
    pub entities: Option<Vec<String>>,
    pub category: Option<String>,
    /// Merged into the existing metadata.
    pub metadata: Option<Map<String, Value>>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn scope(mut self, scope: MemoryScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn domain(mut self, domain: MemoryDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = Some(entities.into_iter().map(Into::into).collect());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    fn apply(self, record: &mut MemoryRecord) {
        if let Some(content) = self.content {
            record.content = content;
        }
        if let Some(importance) = self.importance {
            record.importance = importance;
        }
        if let Some(scope) = self.scope {
            record.scope = scope;
        }
        if let Some(domain) = self.domain {
            record.domain = domain;
        }
        if let Some(entities) = self.entities {
            record.entities = entities;
        }
        if let Some(category) = self.category {
            record.category = Some(category);
        }
        if let Some(metadata) = self.metadata {
            record.metadata.extend(metadata);
        }
    }
}

/// One collection of [`MemoryRecord`]s of a single memory type.
pub(crate) struct RecordCollection {
    pub(crate) index: SharedIndex,
    pub(crate) embedder: SharedEmbedder,
    pub(crate) collection: &'static str,
    pub(crate) memory_type: MemoryType,
}

impl RecordCollection {
    pub(crate) fn new(
        index: SharedIndex,
        embedder: SharedEmbedder,
        collection: &'static str,
        memory_type: MemoryType,
    ) -> Result<Self> {
        index.ensure_collection(collection, embedder.dimensions())?;
        Ok(Self {
            index,
            embedder,
            collection,
            memory_type,
        })
    }

    pub(crate) async fn insert(&self, mut record: MemoryRecord) -> Result<Id> {
        record.memory_type = self.memory_type;
        validate_record(&record)?;

        let vector = self.embedder.embed(&record.content).await?;
        let id = record.id;
        self.index
            .upsert(self.collection, Point::new(id, vector, to_payload(&record)?))?;
        debug!(id = %id, collection = self.collection, agent = %record.agent_id, "Stored record");
        Ok(id)
    }

    /// Ranked search. Touches every returned record.
    pub(crate) async fn search(
        &self,
        query: &str,
        limit: usize,
        params: &RecordQuery,
    ) -> Result<Vec<MemoryRecord>> {
        let vector = self.embedder.embed(query).await?;
        let filter = params.to_filter(self.memory_type);
        let hits = self.index.query(self.collection, &vector, &filter, limit)?;

        let mut records = hits
            .into_iter()
            .map(|hit| from_payload(hit.payload))
            .collect::<Result<Vec<MemoryRecord>>>()?;
        self.touch(&mut records);
        Ok(records)
    }

    /// Unranked filtered scan in insertion order. Does not touch.
    pub(crate) fn scan(&self, params: &RecordQuery, limit: usize) -> Result<Vec<MemoryRecord>> {
        let filter = params.to_filter(self.memory_type);
        self.index
            .scroll(self.collection, &filter, limit)?
            .into_iter()
            .map(|p| from_payload(p.payload))
            .collect()
    }

    pub(crate) fn get(&self, id: Id) -> Result<Option<MemoryRecord>> {
        let mut record = self.peek(id)?;
        if let Some(record) = record.as_mut() {
            self.touch_one(record);
        }
        Ok(record)
    }

    /// Load a record without counting it as an access.
    pub(crate) fn peek(&self, id: Id) -> Result<Option<MemoryRecord>> {
        match self.index.retrieve(self.collection, &[id])?.pop() {
            Some(point) => Ok(Some(from_payload(point.payload)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn touch_one(&self, record: &mut MemoryRecord) {
        self.touch(std::slice::from_mut(record));
    }

    pub(crate) async fn update(&self, id: Id, patch: RecordPatch) -> Result<bool> {
        let Some(point) = self.index.retrieve(self.collection, &[id])?.pop() else {
            return Ok(false);
        };
        let mut record: MemoryRecord = from_payload(point.payload)?;
        let reembed = patch
            .content
            .as_ref()
            .is_some_and(|c| *c != record.content);
        patch.apply(&mut record);
        validate_record(&record)?;

        let vector = if reembed {
            self.embedder.embed(&record.content).await?
        } else {
            point.vector
        };
        self.index
            .upsert(self.collection, Point::new(id, vector, to_payload(&record)?))?;
        debug!(id = %id, collection = self.collection, reembed, "Updated record");
        Ok(true)
    }

    pub(crate) fn set_importance(&self, id: Id, importance: f32) -> Result<bool> {
        let mut patch = Map::new();
        patch.insert("importance".to_string(), json!(importance));
        self.index.set_payload(self.collection, id, patch)
    }

    pub(crate) fn delete(&self, id: Id) -> Result<bool> {
        Ok(self.index.delete(self.collection, &[id])? > 0)
    }

    pub(crate) fn delete_many(&self, ids: &[Id]) -> Result<usize> {
        self.index.delete(self.collection, ids)
    }

    pub(crate) fn count(&self, params: &RecordQuery) -> Result<usize> {
        self.index
            .count(self.collection, &params.to_filter(self.memory_type))
    }

    /// Read bookkeeping. Failures are logged, never surfaced.
    fn touch(&self, records: &mut [MemoryRecord]) {
        for record in records {
            record.touch();
            let mut patch = Map::new();
            patch.insert(
                "accessed_at".to_string(),
                json!(record.accessed_at.timestamp_millis()),
            );
            patch.insert("access_count".to_string(), json!(record.access_count));
            if let Err(e) = self.index.set_payload(self.collection, record.id, patch) {
                warn!(id = %record.id, error = %e, "Failed to record access");
            }
        }
    }
}

/// Log a failed read and fall back to `default`.
pub(crate) fn soft<T>(result: Result<T>, what: &str, default: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, backend = e.is_backend_unavailable(), "{} failed", what);
            default
        }
    }
}
