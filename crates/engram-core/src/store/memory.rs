//! In-Memory Vector Store
//!
//! Reference implementation with the exact trait semantics of the
//! persistent store; backs the test suites. Brute-force cosine scoring
//! with a stable id tie-break keeps results deterministic.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde_json::{Map, Value};

use super::{drain_by_filter, Filter, Point, Result, ScoredPoint, StoreError, VectorStore};
use crate::embeddings::cosine_similarity;

struct MemCollection {
    dimensions: usize,
    // BTreeMap for stable scroll order
    points: BTreeMap<String, (Vec<f32>, Map<String, Value>)>,
}

/// In-memory vector store
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: Mutex<HashMap<String, MemCollection>>,
}

impl MemoryVectorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemCollection>> {
        // A poisoned lock means a panic mid-mutation in this process;
        // the data is plain maps, safe to keep serving.
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl VectorStore for MemoryVectorStore {
    fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.lock();
        if let Some(existing) = collections.get(name) {
            if existing.dimensions == dimensions {
                return Ok(());
            }
            tracing::warn!(
                collection = name,
                old = existing.dimensions,
                new = dimensions,
                "collection dimension changed; recreating"
            );
            collections.remove(name);
        }
        collections.insert(
            name.to_string(),
            MemCollection {
                dimensions,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.lock().get(name).map(|c| c.dimensions))
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        self.lock().remove(name);
        Ok(())
    }

    fn upsert(&self, collection: &str, point: Point) -> Result<()> {
        let mut collections = self.lock();
        let Some(coll) = collections.get_mut(collection) else {
            return Err(StoreError::CollectionNotFound(collection.to_string()));
        };
        if point.vector.len() != coll.dimensions {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                expected: coll.dimensions,
                got: point.vector.len(),
            });
        }
        coll.points.insert(point.id, (point.vector, point.payload));
        Ok(())
    }

    fn upsert_batch(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        for point in points {
            self.upsert(collection, point)?;
        }
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(coll) = self.lock().get_mut(collection) {
            coll.points.remove(id);
        }
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Point>> {
        Ok(self.lock().get(collection).and_then(|coll| {
            coll.points.get(id).map(|(vector, payload)| {
                Point::new(id.to_string(), vector.clone(), payload.clone())
            })
        }))
    }

    fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.lock();
        let Some(coll) = collections.get(collection) else {
            return Ok(vec![]);
        };
        if query.len() != coll.dimensions {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                expected: coll.dimensions,
                got: query.len(),
            });
        }

        let mut hits: Vec<ScoredPoint> = coll
            .points
            .iter()
            .filter(|(_, (_, payload))| filter.is_none_or(|f| f.matches(payload)))
            .map(|(id, (vector, payload))| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(query, vector),
                payload: payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    fn scroll(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
        filter: Option<&Filter>,
        with_vectors: bool,
    ) -> Result<Vec<Point>> {
        let collections = self.lock();
        let Some(coll) = collections.get(collection) else {
            return Ok(vec![]);
        };

        Ok(coll
            .points
            .iter()
            .filter(|(_, (_, payload))| filter.is_none_or(|f| f.matches(payload)))
            .skip(offset)
            .take(limit)
            .map(|(id, (vector, payload))| Point {
                id: id.clone(),
                vector: if with_vectors { vector.clone() } else { vec![] },
                payload: payload.clone(),
            })
            .collect())
    }

    fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize> {
        let collections = self.lock();
        let Some(coll) = collections.get(collection) else {
            return Ok(0);
        };
        Ok(coll
            .points
            .values()
            .filter(|(_, payload)| filter.is_none_or(|f| f.matches(payload)))
            .count())
    }

    fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<usize> {
        drain_by_filter(self, collection, filter)
    }
}
