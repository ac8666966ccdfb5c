//! Process-local index with brute-force cosine ranking.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::info;

use concord_embed::{cosine_similarity, is_zero_vector};
use concord_types::Id;

use super::{Point, ScoredPoint, VectorIndex};
use crate::error::{MemoryError, Result};
use crate::filter::Filter;

#[derive(Debug, Default)]
struct Collection {
    dimensions: usize,
    /// Insertion order is scroll order.
    points: Vec<Point>,
}

impl Collection {
    fn position(&self, id: Id) -> Option<usize> {
        self.points.iter().position(|p| p.id == id)
    }
}

/// In-process [`VectorIndex`]. Nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> MemoryError {
    MemoryError::NotFound(format!("collection {collection}"))
}

impl VectorIndex for InMemoryIndex {
    fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write();
        match collections.get(collection) {
            Some(existing) if existing.dimensions != dimensions => {
                Err(MemoryError::InvalidData(format!(
                    "collection {collection} has {} dimensions, requested {dimensions}",
                    existing.dimensions
                )))
            }
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    collection.to_string(),
                    Collection {
                        dimensions,
                        points: Vec::new(),
                    },
                );
                info!(collection, dimensions, "Created in-memory collection");
                Ok(())
            }
        }
    }

    fn upsert(&self, collection: &str, point: Point) -> Result<()> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        crate::validation::validate_embedding(&point.vector, coll.dimensions)?;
        match coll.position(point.id) {
            Some(i) => coll.points[i] = point,
            None => coll.points.push(point),
        }
        Ok(())
    }

    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;

        let rank = !is_zero_vector(vector);
        let mut hits: Vec<ScoredPoint> = coll
            .points
            .iter()
            .filter(|p| filter.matches(&p.payload))
            .map(|p| ScoredPoint {
                id: p.id,
                score: if rank {
                    cosine_similarity(vector, &p.vector)
                } else {
                    0.0
                },
                payload: p.payload.clone(),
            })
            .collect();

        if rank {
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        }
        hits.truncate(limit);
        Ok(hits)
    }

    fn scroll(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Point>> {
        let collections = self.collections.read();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(coll
            .points
            .iter()
            .filter(|p| filter.matches(&p.payload))
            .take(limit)
            .cloned()
            .collect())
    }

    fn retrieve(&self, collection: &str, ids: &[Id]) -> Result<Vec<Point>> {
        let collections = self.collections.read();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(ids
            .iter()
            .filter_map(|id| coll.position(*id).map(|i| coll.points[i].clone()))
            .collect())
    }

    fn set_payload(&self, collection: &str, id: Id, patch: Map<String, Value>) -> Result<bool> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        let Some(i) = coll.position(id) else {
            return Ok(false);
        };
        coll.points[i].payload.extend(patch);
        Ok(true)
    }

    fn delete(&self, collection: &str, ids: &[Id]) -> Result<usize> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        let before = coll.points.len();
        coll.points.retain(|p| !ids.contains(&p.id));
        Ok(before - coll.points.len())
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let collections = self.collections.read();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(coll.points.iter().filter(|p| filter.matches(&p.payload)).count())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Condition;
    use concord_types::new_id;
    use serde_json::json;

    fn payload(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn index() -> InMemoryIndex {
        let index = InMemoryIndex::new();
        index.ensure_collection("c", 3).unwrap();
        index
    }

    #[test]
    fn test_ensure_collection_dimension_conflict() {
        let index = index();
        assert!(index.ensure_collection("c", 3).is_ok());
        assert!(matches!(
            index.ensure_collection("c", 4),
            Err(MemoryError::InvalidData(_))
        ));
    }

    #[test]
    fn test_query_ranks_and_filters() {
        let index = index();
        let a = new_id();
        let b = new_id();
        let c = new_id();
        index.upsert("c", Point::new(a, vec![1.0, 0.0, 0.0], payload(json!({"k": "x"})))).unwrap();
        index.upsert("c", Point::new(b, vec![0.7, 0.7, 0.0], payload(json!({"k": "x"})))).unwrap();
        index.upsert("c", Point::new(c, vec![1.0, 0.0, 0.0], payload(json!({"k": "y"})))).unwrap();

        let filter = Filter::new().must(Condition::eq("k", "x"));
        let hits = index.query("c", &[1.0, 0.0, 0.0], &filter, 10).unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![a, b]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_zero_query_is_unranked_scan() {
        let index = index();
        let a = new_id();
        let b = new_id();
        index.upsert("c", Point::new(a, vec![0.0, 1.0, 0.0], Map::new())).unwrap();
        index.upsert("c", Point::new(b, vec![1.0, 0.0, 0.0], Map::new())).unwrap();
        let hits = index.query("c", &[0.0, 0.0, 0.0], &Filter::new(), 10).unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn test_upsert_replaces_and_validates() {
        let index = index();
        let id = new_id();
        index.upsert("c", Point::new(id, vec![1.0, 0.0, 0.0], payload(json!({"v": 1})))).unwrap();
        index.upsert("c", Point::new(id, vec![0.0, 1.0, 0.0], payload(json!({"v": 2})))).unwrap();
        assert_eq!(index.count("c", &Filter::new()).unwrap(), 1);
        assert_eq!(index.retrieve("c", &[id]).unwrap()[0].payload["v"], json!(2));

        assert!(index.upsert("c", Point::new(id, vec![1.0], Map::new())).is_err());
        assert!(index.upsert("nope", Point::new(id, vec![1.0, 0.0, 0.0], Map::new())).is_err());
    }

    #[test]
    fn test_set_payload_and_delete() {
        let index = index();
        let id = new_id();
        index.upsert("c", Point::new(id, vec![1.0, 0.0, 0.0], payload(json!({"a": 1, "b": 1})))).unwrap();
        assert!(index.set_payload("c", id, payload(json!({"b": 2}))).unwrap());
        assert!(!index.set_payload("c", new_id(), payload(json!({"b": 2}))).unwrap());

        let point = &index.retrieve("c", &[id]).unwrap()[0];
        assert_eq!(point.payload["a"], json!(1));
        assert_eq!(point.payload["b"], json!(2));

        assert_eq!(index.delete("c", &[id, new_id()]).unwrap(), 1);
        assert!(index.retrieve("c", &[id]).unwrap().is_empty());
    }

    #[test]
    fn test_scroll_keeps_insertion_order() {
        let index = index();
        let ids: Vec<Id> = (0..5).map(|_| new_id()).collect();
        for id in &ids {
            index.upsert("c", Point::new(*id, vec![1.0, 0.0, 0.0], Map::new())).unwrap();
        }
        let scrolled = index.scroll("c", &Filter::new(), 3).unwrap();
        assert_eq!(scrolled.iter().map(|p| p.id).collect::<Vec<_>>(), ids[..3].to_vec());
    }
}
