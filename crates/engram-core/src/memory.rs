//! Memories
//!
//! Stored facts and preferences. A memory lives entirely in the vector
//! store: the embedding plus a payload carrying content, category,
//! importance, tags and creation time. Created by the tool surface,
//! deleted explicitly, never mutated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::embeddings::EmbeddingRegistry;
use crate::enums::MemoryCategory;
use crate::error::{EngineError, Result};
use crate::store::{Filter, Point, VectorStore};

/// Collection holding memory embeddings (semantic dimension)
pub const MEMORIES_COLLECTION: &str = "memories";

/// Maximum memory content length in characters
pub const MAX_MEMORY_CONTENT_CHARS: usize = 10_000;

/// A stored memory
#[derive(Debug, Clone, serde::Serialize)]
pub struct Memory {
    /// Memory id
    pub id: String,
    /// The remembered text
    pub content: String,
    /// Category from the closed set
    pub category: MemoryCategory,
    /// Importance in `[0, 1]`
    pub importance: f64,
    /// Tag set (sorted, unique)
    pub tags: Vec<String>,
    /// Creation time; immutable
    pub created_at: DateTime<Utc>,
}

impl Memory {
    /// Payload stored next to the embedding
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("content".to_string(), json!(self.content));
        payload.insert("category".to_string(), json!(self.category.as_str()));
        payload.insert("importance".to_string(), json!(self.importance));
        payload.insert("tags".to_string(), json!(self.tags));
        payload.insert("created_at".to_string(), json!(self.created_at.to_rfc3339()));
        payload
    }

    /// Rebuild a memory from a stored payload
    pub fn from_payload(id: &str, payload: &Map<String, Value>) -> Result<Self> {
        let content = payload_str(payload, "content")?;
        let category = MemoryCategory::parse_str(&payload_str(payload, "category")?)
            .ok_or_else(|| EngineError::Storage(format!("corrupt category on memory {}", id)))?;
        let importance = payload
            .get("importance")
            .and_then(Value::as_f64)
            .ok_or_else(|| EngineError::Storage(format!("missing importance on memory {}", id)))?;
        let tags = payload
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let created_at = DateTime::parse_from_rfc3339(&payload_str(payload, "created_at")?)
            .map_err(|_| EngineError::Storage(format!("corrupt created_at on memory {}", id)))?
            .with_timezone(&Utc);

        Ok(Self {
            id: id.to_string(),
            content,
            category,
            importance,
            tags,
            created_at,
        })
    }
}

fn payload_str(payload: &Map<String, Value>, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::Storage(format!("missing payload field '{}'", key)))
}

/// Memory operations over the vector store
pub struct Memories {
    store: Arc<dyn VectorStore>,
    registry: EmbeddingRegistry,
}

impl Memories {
    /// Create the service
    pub fn new(store: Arc<dyn VectorStore>, registry: EmbeddingRegistry) -> Self {
        Self { store, registry }
    }

    /// Lazily create the collection so a cold start never sees
    /// "collection not found"
    pub fn ensure_collection(&self) -> Result<()> {
        self.store
            .ensure_collection(MEMORIES_COLLECTION, self.registry.semantic().dimension())?;
        Ok(())
    }

    /// Store a new memory. Importance outside `[0, 1]` is rejected, never
    /// clamped; content above the character cap is rejected.
    pub fn store(
        &self,
        content: &str,
        category: MemoryCategory,
        importance: f64,
        tags: Vec<String>,
    ) -> Result<Memory> {
        if content.trim().is_empty() {
            return Err(EngineError::Validation("content cannot be empty".to_string()));
        }
        if content.chars().count() > MAX_MEMORY_CONTENT_CHARS {
            return Err(EngineError::Validation(format!(
                "content exceeds {} characters",
                MAX_MEMORY_CONTENT_CHARS
            )));
        }
        if !(0.0..=1.0).contains(&importance) {
            return Err(EngineError::Validation(format!(
                "importance {} out of range; must be within [0, 1]",
                importance
            )));
        }

        let mut tags = tags;
        tags.sort();
        tags.dedup();

        self.ensure_collection()?;
        let vector = self.registry.semantic().embed(content)?;

        let memory = Memory {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            category,
            importance,
            tags,
            created_at: Utc::now(),
        };

        self.store.upsert(
            MEMORIES_COLLECTION,
            Point::new(memory.id.clone(), vector, memory.to_payload()),
        )?;

        Ok(memory)
    }

    /// List memories, newest first, with optional category and tag filters.
    /// Tag filtering requires every requested tag to be present.
    pub fn list(
        &self,
        category: Option<MemoryCategory>,
        tags: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Memory>> {
        self.ensure_collection()?;

        let filter = category.map(|c| Filter::new().eq("category", c.as_str()));

        // Tag filtering happens in Rust (the filter grammar has no
        // array-contains), so scroll unpaged and page after filtering.
        let mut memories = Vec::new();
        let mut scroll_offset = 0;
        const PAGE: usize = 256;
        loop {
            let page =
                self.store
                    .scroll(MEMORIES_COLLECTION, PAGE, scroll_offset, filter.as_ref(), false)?;
            let page_len = page.len();
            for point in page {
                let memory = Memory::from_payload(&point.id, &point.payload)?;
                if tags.iter().all(|t| memory.tags.contains(t)) {
                    memories.push(memory);
                }
            }
            if page_len < PAGE {
                break;
            }
            scroll_offset += PAGE;
        }

        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(memories.into_iter().skip(offset).take(limit).collect())
    }

    /// Delete a memory; `not_found` if it does not exist
    pub fn delete(&self, id: &str) -> Result<()> {
        self.ensure_collection()?;
        if self.store.get(MEMORIES_COLLECTION, id)?.is_none() {
            return Err(EngineError::NotFound(format!("memory {}", id)));
        }
        self.store.delete(MEMORIES_COLLECTION, id)?;
        Ok(())
    }

    /// Count stored memories
    pub fn count(&self) -> Result<usize> {
        self.ensure_collection()?;
        Ok(self.store.count(MEMORIES_COLLECTION, None)?)
    }
}
