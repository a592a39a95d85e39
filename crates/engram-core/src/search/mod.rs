//! Unified Search
//!
//! One typed facade over the vector store, one method and one canonical
//! result type per domain. Every method validates its inputs against the
//! closed enum sets, embeds the query with the domain-appropriate
//! embedder, translates the generic filter grammar, and returns hits in
//! descending score order. The abstract interface ([`SearchOps`]) and the
//! concrete [`Searcher`] share a single method-signature contract.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde_json::json;

use crate::embeddings::EmbeddingRegistry;
use crate::enums::{Axis, ConfidenceTier, Domain, Language, MemoryCategory, Outcome, Strategy};
use crate::error::{EngineError, Result};
use crate::git::{CommitInfo, COMMITS_COLLECTION};
use crate::index::{CodeUnit, CODE_UNITS_COLLECTION};
use crate::memory::{Memory, MEMORIES_COLLECTION};
use crate::store::{Filter, VectorStore};

/// Collection holding value embeddings (semantic dimension)
pub const VALUES_COLLECTION: &str = "values";

// ============================================================================
// RESULT TYPES (one canonical type per domain)
// ============================================================================

/// A memory search hit
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryHit {
    /// The memory
    pub memory: Memory,
    /// Similarity score
    pub score: f32,
}

/// A code search hit
#[derive(Debug, Clone, serde::Serialize)]
pub struct CodeHit {
    /// The code unit
    pub unit: CodeUnit,
    /// Similarity score
    pub score: f32,
}

/// An experience search hit (one axis embedding of a resolved episode)
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExperienceHit {
    /// Resolved GHAP id
    pub ghap_id: String,
    /// Axis the hit came from
    pub axis: Axis,
    /// Rendered axis text
    pub text: String,
    /// Episode domain
    pub domain: Domain,
    /// Episode strategy
    pub strategy: Strategy,
    /// Episode outcome
    pub outcome: Option<Outcome>,
    /// Confidence tier
    pub confidence_tier: ConfidenceTier,
    /// Episode creation time
    pub created_at: DateTime<Utc>,
    /// Similarity score
    pub score: f32,
}

/// A value search hit
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValueHit {
    /// Value id
    pub id: String,
    /// Source axis
    pub axis: Axis,
    /// Source cluster
    pub cluster_id: i64,
    /// The distilled text
    pub text: String,
    /// Similarity of the value embedding to its cluster centroid
    pub similarity_to_centroid: f64,
    /// Storage time
    pub created_at: DateTime<Utc>,
    /// Similarity score to the query
    pub score: f32,
}

/// A commit search hit
#[derive(Debug, Clone, serde::Serialize)]
pub struct CommitHit {
    /// The commit
    pub commit: CommitInfo,
    /// Similarity score
    pub score: f32,
}

// ============================================================================
// SEARCH CONTRACT
// ============================================================================

/// The single search interface. The concrete implementation implements
/// exactly this; a second diverging copy of these signatures is the
/// historical bug this trait exists to prevent.
pub trait SearchOps: Send + Sync {
    /// Search stored memories
    fn search_memories(
        &self,
        query: &str,
        limit: usize,
        category: Option<MemoryCategory>,
        min_importance: Option<f64>,
    ) -> Result<Vec<MemoryHit>>;

    /// Search indexed code units
    fn search_code(
        &self,
        query: &str,
        limit: usize,
        project: Option<&str>,
        language: Option<Language>,
    ) -> Result<Vec<CodeHit>>;

    /// Search resolved experiences on one axis
    fn search_experiences(
        &self,
        query: &str,
        limit: usize,
        axis: Axis,
        domain: Option<Domain>,
        outcome: Option<Outcome>,
    ) -> Result<Vec<ExperienceHit>>;

    /// Search distilled values
    fn search_values(&self, query: &str, limit: usize, axis: Option<Axis>)
        -> Result<Vec<ValueHit>>;

    /// Search indexed commits
    fn search_commits(
        &self,
        query: &str,
        limit: usize,
        author: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitHit>>;
}

// ============================================================================
// SEARCHER
// ============================================================================

/// Query-embedding cache capacity
const QUERY_CACHE_CAPACITY: usize = 100;

/// Concrete search facade
pub struct Searcher {
    store: Arc<dyn VectorStore>,
    registry: EmbeddingRegistry,
    /// LRU cache so repeated queries are not re-embedded
    query_cache: Mutex<LruCache<(bool, String), Vec<f32>>>,
}

impl Searcher {
    /// Create the facade
    pub fn new(store: Arc<dyn VectorStore>, registry: EmbeddingRegistry) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            registry,
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn validate_query(query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(EngineError::Validation("query cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Embed a query through the cache. The key carries which embedder
    /// produced the vector, so code and semantic queries never collide.
    fn query_vector(&self, semantic: bool, query: &str) -> Result<Vec<f32>> {
        let key = (semantic, query.to_string());
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(vector) = cache.get(&key) {
                return Ok(vector.clone());
            }
        }

        let embedder = if semantic {
            self.registry.semantic()
        } else {
            self.registry.code()
        };
        let vector = embedder.embed(query)?;

        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(key, vector.clone());
        }
        Ok(vector)
    }

    /// Cold start: every read path creates its collection first
    fn ensure(&self, collection: &str, semantic: bool) -> Result<()> {
        let dimensions = if semantic {
            self.registry.semantic().dimension()
        } else {
            self.registry.code().dimension()
        };
        self.store.ensure_collection(collection, dimensions)?;
        Ok(())
    }
}

impl SearchOps for Searcher {
    fn search_memories(
        &self,
        query: &str,
        limit: usize,
        category: Option<MemoryCategory>,
        min_importance: Option<f64>,
    ) -> Result<Vec<MemoryHit>> {
        Self::validate_query(query)?;
        if let Some(min_importance) = min_importance {
            if !(0.0..=1.0).contains(&min_importance) {
                return Err(EngineError::Validation(format!(
                    "min_importance {} out of range; must be within [0, 1]",
                    min_importance
                )));
            }
        }
        self.ensure(MEMORIES_COLLECTION, true)?;

        let mut filter = Filter::new();
        if let Some(category) = category {
            filter = filter.eq("category", category.as_str());
        }
        if let Some(min_importance) = min_importance {
            filter = filter.range("importance", Some(min_importance), None, None, None);
        }
        let filter = (!filter.is_empty()).then_some(filter);

        let vector = self.query_vector(true, query)?;
        let hits = self
            .store
            .search(MEMORIES_COLLECTION, &vector, limit, filter.as_ref())?;

        hits.into_iter()
            .map(|hit| {
                Ok(MemoryHit {
                    memory: Memory::from_payload(&hit.id, &hit.payload)?,
                    score: hit.score,
                })
            })
            .collect()
    }

    fn search_code(
        &self,
        query: &str,
        limit: usize,
        project: Option<&str>,
        language: Option<Language>,
    ) -> Result<Vec<CodeHit>> {
        Self::validate_query(query)?;
        self.ensure(CODE_UNITS_COLLECTION, false)?;

        let mut filter = Filter::new();
        if let Some(project) = project {
            filter = filter.eq("project", project);
        }
        if let Some(language) = language {
            filter = filter.eq("language", language.as_str());
        }
        let filter = (!filter.is_empty()).then_some(filter);

        let vector = self.query_vector(false, query)?;
        let hits = self
            .store
            .search(CODE_UNITS_COLLECTION, &vector, limit, filter.as_ref())?;

        hits.into_iter()
            .map(|hit| {
                Ok(CodeHit {
                    unit: CodeUnit::from_payload(&hit.id, &hit.payload)?,
                    score: hit.score,
                })
            })
            .collect()
    }

    fn search_experiences(
        &self,
        query: &str,
        limit: usize,
        axis: Axis,
        domain: Option<Domain>,
        outcome: Option<Outcome>,
    ) -> Result<Vec<ExperienceHit>> {
        Self::validate_query(query)?;
        self.ensure(axis.collection_name(), true)?;

        let mut filter = Filter::new();
        if let Some(domain) = domain {
            filter = filter.eq("domain", domain.as_str());
        }
        if let Some(outcome) = outcome {
            filter = filter.eq("outcome", outcome.as_str());
        }
        let filter = (!filter.is_empty()).then_some(filter);

        let vector = self.query_vector(true, query)?;
        let hits = self
            .store
            .search(axis.collection_name(), &vector, limit, filter.as_ref())?;

        hits.into_iter()
            .map(|hit| {
                let payload = &hit.payload;
                let get_str = |key: &str| -> Result<String> {
                    payload
                        .get(key)
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            EngineError::Storage(format!("missing experience field '{}'", key))
                        })
                };
                Ok(ExperienceHit {
                    ghap_id: get_str("ghap_id")?,
                    axis,
                    text: get_str("text")?,
                    domain: Domain::parse_str(&get_str("domain")?).ok_or_else(|| {
                        EngineError::Storage("corrupt experience domain".to_string())
                    })?,
                    strategy: Strategy::parse_str(&get_str("strategy")?).ok_or_else(|| {
                        EngineError::Storage("corrupt experience strategy".to_string())
                    })?,
                    outcome: payload
                        .get("outcome")
                        .and_then(serde_json::Value::as_str)
                        .and_then(Outcome::parse_str),
                    confidence_tier: ConfidenceTier::parse_str(&get_str("confidence_tier")?)
                        .unwrap_or(ConfidenceTier::Abandoned),
                    created_at: DateTime::parse_from_rfc3339(&get_str("created_at")?)
                        .map_err(|_| {
                            EngineError::Storage("corrupt experience created_at".to_string())
                        })?
                        .with_timezone(&Utc),
                    score: hit.score,
                })
            })
            .collect()
    }

    fn search_values(
        &self,
        query: &str,
        limit: usize,
        axis: Option<Axis>,
    ) -> Result<Vec<ValueHit>> {
        Self::validate_query(query)?;
        self.ensure(VALUES_COLLECTION, true)?;

        let filter = axis.map(|axis| Filter::new().eq("axis", axis.as_str()));

        let vector = self.query_vector(true, query)?;
        let hits = self
            .store
            .search(VALUES_COLLECTION, &vector, limit, filter.as_ref())?;

        hits.into_iter()
            .map(|hit| {
                let payload = &hit.payload;
                let axis = payload
                    .get("axis")
                    .and_then(serde_json::Value::as_str)
                    .and_then(Axis::parse_str)
                    .ok_or_else(|| EngineError::Storage("corrupt value axis".to_string()))?;
                Ok(ValueHit {
                    id: hit.id.clone(),
                    axis,
                    cluster_id: payload
                        .get("cluster_id")
                        .and_then(serde_json::Value::as_i64)
                        .unwrap_or(NOISE_CLUSTER),
                    text: payload
                        .get("text")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    similarity_to_centroid: payload
                        .get("similarity_to_centroid")
                        .and_then(serde_json::Value::as_f64)
                        .unwrap_or(0.0),
                    created_at: payload
                        .get("created_at")
                        .and_then(serde_json::Value::as_str)
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now),
                    score: hit.score,
                })
            })
            .collect()
    }

    fn search_commits(
        &self,
        query: &str,
        limit: usize,
        author: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitHit>> {
        Self::validate_query(query)?;
        self.ensure(COMMITS_COLLECTION, true)?;

        let mut filter = Filter::new();
        if let Some(author) = author {
            filter = filter.eq("author", author);
        }
        if let Some(since) = since {
            // Half-open window: commits at or after `since`
            filter = filter.range("timestamp", Some(since.timestamp() as f64), None, None, None);
        }
        let filter = (!filter.is_empty()).then_some(filter);

        let vector = self.query_vector(true, query)?;
        let hits = self
            .store
            .search(COMMITS_COLLECTION, &vector, limit, filter.as_ref())?;

        hits.into_iter()
            .map(|hit| {
                Ok(CommitHit {
                    commit: CommitInfo::from_payload(&hit.payload)?,
                    score: hit.score,
                })
            })
            .collect()
    }
}

const NOISE_CLUSTER: i64 = -1;

/// Build the payload stored next to a value embedding
pub fn value_payload(
    id: &str,
    axis: Axis,
    cluster_id: i64,
    text: &str,
    similarity_to_centroid: f64,
    created_at: DateTime<Utc>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut payload = serde_json::Map::new();
    payload.insert("id".to_string(), json!(id));
    payload.insert("axis".to_string(), json!(axis.as_str()));
    payload.insert("cluster_id".to_string(), json!(cluster_id));
    payload.insert("text".to_string(), json!(text));
    payload.insert(
        "similarity_to_centroid".to_string(),
        json!(similarity_to_centroid),
    );
    payload.insert("created_at".to_string(), json!(created_at.to_rfc3339()));
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memories;
    use crate::store::MemoryVectorStore;

    fn searcher() -> (Searcher, Memories, Arc<dyn VectorStore>) {
        let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        let registry = EmbeddingRegistry::deterministic();
        (
            Searcher::new(store.clone(), registry.clone()),
            Memories::new(store.clone(), registry),
            store,
        )
    }

    #[test]
    fn cold_start_returns_empty_not_an_error() {
        let (searcher, _, _) = searcher();
        assert!(searcher.search_memories("anything", 5, None, None).unwrap().is_empty());
        assert!(searcher.search_code("anything", 5, None, None).unwrap().is_empty());
        assert!(searcher
            .search_experiences("anything", 5, Axis::Full, None, None)
            .unwrap()
            .is_empty());
        assert!(searcher.search_values("anything", 5, None).unwrap().is_empty());
        assert!(searcher.search_commits("anything", 5, None, None).unwrap().is_empty());
    }

    #[test]
    fn empty_query_is_rejected() {
        let (searcher, _, _) = searcher();
        let err = searcher.search_memories("  ", 5, None, None).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn stored_memory_is_the_top_hit_for_its_own_words() {
        let (searcher, memories, _) = searcher();
        memories
            .store("prefer rebase over merge", MemoryCategory::Preference, 0.8, vec![])
            .unwrap();
        memories
            .store("the office plant needs watering", MemoryCategory::Fact, 0.2, vec![])
            .unwrap();

        let hits = searcher
            .search_memories("merge strategy rebase", 3, None, None)
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].memory.content, "prefer rebase over merge");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn min_importance_filters_low_importance_memories() {
        let (searcher, memories, _) = searcher();
        memories
            .store("merge policy one", MemoryCategory::Fact, 0.9, vec![])
            .unwrap();
        memories
            .store("merge policy two", MemoryCategory::Fact, 0.1, vec![])
            .unwrap();

        let hits = searcher
            .search_memories("merge policy", 10, None, Some(0.5))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].memory.importance >= 0.5);
    }

    #[test]
    fn out_of_range_min_importance_is_rejected() {
        let (searcher, _, _) = searcher();
        let err = searcher
            .search_memories("q", 5, None, Some(1.5))
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("[0, 1]"));
    }

    #[test]
    fn commit_since_filter_is_inclusive_at_the_boundary() {
        let (searcher, _, store) = searcher();
        let registry = EmbeddingRegistry::deterministic();
        store
            .ensure_collection(COMMITS_COLLECTION, registry.semantic().dimension())
            .unwrap();

        let midnight = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        for (sha, offset) in [("old", -10), ("boundary", 0), ("new", 10)] {
            let info = CommitInfo {
                sha: sha.to_string(),
                message: format!("fix cache bug {}", sha),
                author: "A".to_string(),
                author_email: "a@x".to_string(),
                timestamp: DateTime::from_timestamp(midnight.timestamp() + offset, 0).unwrap(),
                files_changed: 1,
                insertions: 1,
                deletions: 0,
            };
            let vector = registry.semantic().embed(&info.message).unwrap();
            store
                .upsert(
                    COMMITS_COLLECTION,
                    crate::store::Point::new(info.sha.clone(), vector, info.to_payload()),
                )
                .unwrap();
        }

        let hits = searcher
            .search_commits("cache bug", 10, None, Some(midnight))
            .unwrap();
        let shas: Vec<&str> = hits.iter().map(|h| h.commit.sha.as_str()).collect();
        assert!(shas.contains(&"boundary"));
        assert!(shas.contains(&"new"));
        assert!(!shas.contains(&"old"));
    }
}
