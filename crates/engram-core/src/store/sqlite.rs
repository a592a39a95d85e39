//! Persistent Vector Store
//!
//! SQLite-backed collections: a registry table for dimensions, a points
//! table with little-endian f32 vector blobs and JSON payloads. Filters
//! evaluate in Rust with the shared matcher; unfiltered k-NN goes through
//! a lazily rebuilt per-collection HNSW index when the `vector-search`
//! feature is enabled.
//!
//! Separate reader/writer connections behind Mutexes keep all methods
//! `&self` so callers can share the store as `Arc<SqliteVectorStore>`.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::{drain_by_filter, Filter, Point, Result, ScoredPoint, StoreError, VectorStore};
use crate::embeddings::cosine_similarity;

#[cfg(feature = "vector-search")]
use std::collections::HashMap;

#[cfg(feature = "vector-search")]
use super::hnsw::CollectionIndex;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vector_collections (
    name TEXT PRIMARY KEY,
    dimensions INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vector_points (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    vector BLOB NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_vector_points_collection ON vector_points(collection);
"#;

/// Persistent vector store
pub struct SqliteVectorStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    #[cfg(feature = "vector-search")]
    indexes: Mutex<HashMap<String, CollectionIndex>>,
}

impl SqliteVectorStore {
    /// Open (or create) the store at `path` with the default timeout
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_secs_f64(5.0))
    }

    /// Open with an explicit busy timeout. The `Duration` keeps fractional
    /// seconds; no integer-second truncation happens on this path.
    pub fn open_with_timeout(path: &Path, timeout: Duration) -> Result<Self> {
        let writer = Connection::open(path)?;
        Self::configure_connection(&writer, timeout)?;
        writer.execute_batch(SCHEMA)?;

        let reader = Connection::open(path)?;
        Self::configure_connection(&reader, timeout)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            #[cfg(feature = "vector-search")]
            indexes: Mutex::new(HashMap::new()),
        })
    }

    fn configure_connection(conn: &Connection, timeout: Duration) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.busy_timeout(timeout)?;
        Ok(())
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Corrupt("writer lock poisoned".to_string()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Corrupt("reader lock poisoned".to_string()))
    }

    fn dimensions_of(conn: &Connection, name: &str) -> Result<Option<usize>> {
        let dims: Option<i64> = conn
            .query_row(
                "SELECT dimensions FROM vector_collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dims.map(|d| d as usize))
    }

    /// All `(id, vector, payload)` rows of a collection in id order
    fn load_rows(
        &self,
        collection: &str,
        with_vectors: bool,
    ) -> Result<Vec<(String, Vec<f32>, Map<String, Value>)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, vector, payload FROM vector_points
             WHERE collection = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![collection], |row| {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let payload: String = row.get(2)?;
            Ok((id, blob, payload))
        })?;

        let mut points = Vec::new();
        for row in rows {
            let (id, blob, payload) = row?;
            let vector = if with_vectors {
                vector_from_bytes(&blob)
                    .ok_or_else(|| StoreError::Corrupt(format!("bad vector blob for point {}", id)))?
            } else {
                vec![]
            };
            let payload: Map<String, Value> = serde_json::from_str(&payload)
                .map_err(|e| StoreError::Corrupt(format!("bad payload for point {}: {}", id, e)))?;
            points.push((id, vector, payload));
        }
        Ok(points)
    }

    #[cfg(feature = "vector-search")]
    fn drop_index(&self, collection: &str) {
        if let Ok(mut indexes) = self.indexes.lock() {
            indexes.remove(collection);
        }
    }

    /// Unfiltered k-NN through the HNSW index, building it from stored rows
    /// on first use
    #[cfg(feature = "vector-search")]
    fn search_indexed(
        &self,
        collection: &str,
        dimensions: usize,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let mut indexes = self
            .indexes
            .lock()
            .map_err(|_| StoreError::Corrupt("index lock poisoned".to_string()))?;

        if !indexes.contains_key(collection) || indexes[collection].dimensions() != dimensions {
            let mut index = CollectionIndex::new(dimensions)?;
            for (id, vector, _) in self.load_rows(collection, true)? {
                index.add(&id, &vector)?;
            }
            indexes.insert(collection.to_string(), index);
        }

        let hits = indexes[collection].search(query, limit)?;
        drop(indexes);

        let reader = self.reader()?;
        let mut results = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            let payload: Option<String> = reader
                .query_row(
                    "SELECT payload FROM vector_points WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(payload) = payload {
                let payload: Map<String, Value> = serde_json::from_str(&payload)
                    .map_err(|e| StoreError::Corrupt(format!("bad payload for point {}: {}", id, e)))?;
                results.push(ScoredPoint { id, score, payload });
            }
        }
        Ok(results)
    }

    fn search_scan(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut hits: Vec<ScoredPoint> = self
            .load_rows(collection, true)?
            .into_iter()
            .filter(|(_, _, payload)| filter.is_none_or(|f| f.matches(payload)))
            .map(|(id, vector, payload)| ScoredPoint {
                score: cosine_similarity(query, &vector),
                id,
                payload,
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
}

impl VectorStore for SqliteVectorStore {
    fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let writer = self.writer()?;
        if let Some(existing) = Self::dimensions_of(&writer, name)? {
            if existing == dimensions {
                return Ok(());
            }
            tracing::warn!(
                collection = name,
                old = existing,
                new = dimensions,
                "collection dimension changed; recreating"
            );
            writer.execute(
                "DELETE FROM vector_points WHERE collection = ?1",
                params![name],
            )?;
            #[cfg(feature = "vector-search")]
            self.drop_index(name);
        }
        writer.execute(
            "INSERT OR REPLACE INTO vector_collections (name, dimensions, created_at)
             VALUES (?1, ?2, ?3)",
            params![name, dimensions as i64, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        let reader = self.reader()?;
        Self::dimensions_of(&reader, name)
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "DELETE FROM vector_points WHERE collection = ?1",
            params![name],
        )?;
        writer.execute(
            "DELETE FROM vector_collections WHERE name = ?1",
            params![name],
        )?;
        #[cfg(feature = "vector-search")]
        self.drop_index(name);
        Ok(())
    }

    fn upsert(&self, collection: &str, point: Point) -> Result<()> {
        self.upsert_batch(collection, vec![point])
    }

    fn upsert_batch(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let mut writer = self.writer()?;
        let Some(dimensions) = Self::dimensions_of(&writer, collection)? else {
            return Err(StoreError::CollectionNotFound(collection.to_string()));
        };

        let tx = writer.transaction()?;
        for point in &points {
            if point.vector.len() != dimensions {
                return Err(StoreError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected: dimensions,
                    got: point.vector.len(),
                });
            }
            let payload = serde_json::to_string(&point.payload)
                .map_err(|e| StoreError::Corrupt(format!("unserializable payload: {}", e)))?;
            tx.execute(
                "INSERT OR REPLACE INTO vector_points (collection, id, vector, payload)
                 VALUES (?1, ?2, ?3, ?4)",
                params![collection, point.id, vector_to_bytes(&point.vector), payload],
            )?;
        }
        tx.commit()?;

        #[cfg(feature = "vector-search")]
        {
            let mut indexes = self
                .indexes
                .lock()
                .map_err(|_| StoreError::Corrupt("index lock poisoned".to_string()))?;
            if let Some(index) = indexes.get_mut(collection) {
                for point in &points {
                    index.add(&point.id, &point.vector)?;
                }
            }
        }

        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "DELETE FROM vector_points WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        drop(writer);

        #[cfg(feature = "vector-search")]
        {
            let mut indexes = self
                .indexes
                .lock()
                .map_err(|_| StoreError::Corrupt("index lock poisoned".to_string()))?;
            if let Some(index) = indexes.get_mut(collection) {
                index.remove(id)?;
            }
        }
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Point>> {
        let reader = self.reader()?;
        let row: Option<(Vec<u8>, String)> = reader
            .query_row(
                "SELECT vector, payload FROM vector_points
                 WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((blob, payload)) = row else {
            return Ok(None);
        };
        let vector = vector_from_bytes(&blob)
            .ok_or_else(|| StoreError::Corrupt(format!("bad vector blob for point {}", id)))?;
        let payload: Map<String, Value> = serde_json::from_str(&payload)
            .map_err(|e| StoreError::Corrupt(format!("bad payload for point {}: {}", id, e)))?;
        Ok(Some(Point::new(id.to_string(), vector, payload)))
    }

    fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        let Some(dimensions) = self.collection_dimensions(collection)? else {
            return Ok(vec![]);
        };
        if query.len() != dimensions {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                expected: dimensions,
                got: query.len(),
            });
        }

        #[cfg(feature = "vector-search")]
        if filter.is_none_or(|f| f.is_empty()) {
            return self.search_indexed(collection, dimensions, query, limit);
        }

        self.search_scan(collection, query, limit, filter)
    }

    fn scroll(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
        filter: Option<&Filter>,
        with_vectors: bool,
    ) -> Result<Vec<Point>> {
        Ok(self
            .load_rows(collection, with_vectors)?
            .into_iter()
            .filter(|(_, _, payload)| filter.is_none_or(|f| f.matches(payload)))
            .skip(offset)
            .take(limit)
            .map(|(id, vector, payload)| Point {
                id,
                vector,
                payload,
            })
            .collect())
    }

    fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize> {
        match filter {
            None => {
                let reader = self.reader()?;
                let count: i64 = reader.query_row(
                    "SELECT COUNT(*) FROM vector_points WHERE collection = ?1",
                    params![collection],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            }
            Some(filter) => Ok(self
                .load_rows(collection, false)?
                .iter()
                .filter(|(_, _, payload)| filter.matches(payload))
                .count()),
        }
    }

    fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<usize> {
        drain_by_filter(self, collection, filter)
    }
}

/// Vector → little-endian f32 bytes
fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Little-endian f32 bytes → vector; `None` on a torn blob
fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
