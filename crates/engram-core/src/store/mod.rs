//! Vector Store
//!
//! Named collections of `(id, vector, payload)` points with a fixed
//! dimension per collection. Two implementations share the trait and must
//! behave identically: [`SqliteVectorStore`] (persistent) and
//! [`MemoryVectorStore`] (tests).
//!
//! "Not found" is an empty result for search/scroll/count; deleting a
//! missing id is a no-op. `ensure_collection` with a different dimension
//! deletes and recreates the collection — the sole dimension-migration
//! mechanism.

mod filter;
#[cfg(feature = "vector-search")]
mod hnsw;
mod memory;
mod sqlite;

pub use filter::{Condition, Filter};
pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use serde_json::{Map, Value};

/// Page size for paginated scans inside `delete_by_filter`
pub(crate) const DELETE_PAGE_SIZE: usize = 128;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Collection does not exist where one is required (upsert/delete paths)
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    /// Vector length does not match the collection dimension
    #[error("dimension mismatch in {collection}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Collection name
        collection: String,
        /// Collection dimension
        expected: usize,
        /// Supplied vector length
        got: usize,
    },
    /// Malformed filter object
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Request exceeded its deadline; fractional seconds preserved
    #[error("store request timed out after {0}s")]
    Timeout(f64),
    /// Corrupt stored data
    #[error("corrupt point data: {0}")]
    Corrupt(String),
}

/// Vector store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// POINT TYPES
// ============================================================================

/// A stored point: id, vector and JSON payload
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Opaque point id
    pub id: String,
    /// Vector; empty when scrolled `with_vectors = false`
    pub vector: Vec<f32>,
    /// Payload object
    pub payload: Map<String, Value>,
}

impl Point {
    /// Construct a point
    pub fn new(id: impl Into<String>, vector: Vec<f32>, payload: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }
}

/// A search hit: point id, similarity score, payload
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Point id
    pub id: String,
    /// Cosine similarity to the query, descending across a result set
    pub score: f32,
    /// Payload object
    pub payload: Map<String, Value>,
}

// ============================================================================
// VECTOR STORE TRAIT
// ============================================================================

/// Named-collection vector storage
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent. If present with a different
    /// dimension, delete and recreate it (logged as a warning).
    fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Dimension of a collection, `None` if it does not exist
    fn collection_dimensions(&self, name: &str) -> Result<Option<usize>>;

    /// Drop a collection and all of its points; no-op if absent
    fn drop_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace a point
    fn upsert(&self, collection: &str, point: Point) -> Result<()>;

    /// Insert or replace a batch of points
    fn upsert_batch(&self, collection: &str, points: Vec<Point>) -> Result<()>;

    /// Delete a point; deleting a missing id is a no-op
    fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Point lookup; `None` when absent
    fn get(&self, collection: &str, id: &str) -> Result<Option<Point>>;

    /// k-NN search ordered by descending score. A missing collection
    /// returns an empty result.
    fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Paged iteration in stable id order. A missing collection returns an
    /// empty result.
    fn scroll(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
        filter: Option<&Filter>,
        with_vectors: bool,
    ) -> Result<Vec<Point>>;

    /// Count matching points; 0 for a missing collection
    fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize>;

    /// Delete every matching point, paginating until the match set is
    /// empty. Returns the number of deleted points.
    fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<usize>;
}

/// Shared pagination loop for `delete_by_filter`: scroll a page at offset 0,
/// delete it, repeat until nothing matches. Never bounded by a single page.
pub(crate) fn drain_by_filter<S: VectorStore + ?Sized>(
    store: &S,
    collection: &str,
    filter: &Filter,
) -> Result<usize> {
    let mut deleted = 0;
    loop {
        let page = store.scroll(collection, DELETE_PAGE_SIZE, 0, Some(filter), false)?;
        if page.is_empty() {
            return Ok(deleted);
        }
        for point in page {
            store.delete(collection, &point.id)?;
            deleted += 1;
        }
    }
}
