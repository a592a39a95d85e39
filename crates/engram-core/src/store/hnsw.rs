//! HNSW Acceleration
//!
//! Per-collection USearch index used by the persistent store for
//! unfiltered k-NN. Rebuilt lazily from stored rows; kept in sync
//! incrementally on upsert/delete. String ids map to u64 keys because
//! USearch keys are numeric.

use std::collections::HashMap;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::StoreError;

/// HNSW connectivity parameter
const CONNECTIVITY: usize = 16;

/// Expansion factor for index building
const EXPANSION_ADD: usize = 128;

/// Expansion factor for search
const EXPANSION_SEARCH: usize = 64;

/// An HNSW index over one collection
pub(crate) struct CollectionIndex {
    index: Index,
    dimensions: usize,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl CollectionIndex {
    pub(crate) fn new(dimensions: usize) -> Result<Self, StoreError> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: CONNECTIVITY,
            expansion_add: EXPANSION_ADD,
            expansion_search: EXPANSION_SEARCH,
            multi: false,
        };

        let index = Index::new(&options)
            .map_err(|e| StoreError::Corrupt(format!("hnsw index creation failed: {}", e)))?;

        Ok(Self {
            index,
            dimensions,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }

    pub(crate) fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub(crate) fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), StoreError> {
        if let Some(&existing) = self.key_to_id.get(key) {
            self.index
                .remove(existing)
                .map_err(|e| StoreError::Corrupt(format!("hnsw remove failed: {}", e)))?;
            self.reserve_for(self.index.size() + 1)?;
            self.index
                .add(existing, vector)
                .map_err(|e| StoreError::Corrupt(format!("hnsw add failed: {}", e)))?;
            return Ok(());
        }

        // usearch requires reserve() before add()
        if self.index.size() >= self.index.capacity() {
            let new_capacity = std::cmp::max(self.index.capacity() * 2, 16);
            self.reserve_for(new_capacity)?;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.index
            .add(id, vector)
            .map_err(|e| StoreError::Corrupt(format!("hnsw add failed: {}", e)))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.index
                .remove(id)
                .map_err(|e| StoreError::Corrupt(format!("hnsw remove failed: {}", e)))?;
        }
        Ok(())
    }

    /// k-NN search returning `(id, similarity)` pairs, best first
    pub(crate) fn search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<(String, f32)>, StoreError> {
        if self.index.size() == 0 {
            return Ok(vec![]);
        }

        let matches = self
            .index
            .search(query, limit)
            .map_err(|e| StoreError::Corrupt(format!("hnsw search failed: {}", e)))?;

        let mut results = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let Some(id) = self.id_to_key.get(key) {
                // Cosine distance → similarity
                results.push((id.clone(), 1.0 - distance));
            }
        }
        Ok(results)
    }

    fn reserve_for(&self, capacity: usize) -> Result<(), StoreError> {
        self.index
            .reserve(capacity)
            .map_err(|e| StoreError::Corrupt(format!("hnsw reserve failed: {}", e)))
    }
}
