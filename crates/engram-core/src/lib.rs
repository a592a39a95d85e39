//! # Engram Core
//!
//! Memory and learning engine for a code-assistant agent:
//!
//! - **Memories**: semantically searchable facts and preferences
//! - **Code index**: semantic units extracted from nine languages, with
//!   content-hash change detection
//! - **Git index**: embedded commit history, churn hotspots, author stats
//! - **GHAP**: Goal-Hypothesis-Action-Prediction learning episodes with a
//!   strict one-active-per-session state machine
//! - **Clustering**: density-based experience clustering with
//!   confidence-tier-weighted centroids, distilling reusable values
//! - **Context assembly**: token-budgeted, de-duplicated context blocks
//!
//! Two stateful sinks hold everything: a named-collection vector store
//! (persistent SQLite-backed or in-memory) and a relational metadata
//! store. Embeddings come from a lazily initialized two-model registry.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::{EmbeddingRegistry, Memories, MemoryCategory, SqliteVectorStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteVectorStore::open("vectors.db".as_ref())?);
//! let registry = EmbeddingRegistry::local();
//! let memories = Memories::new(store, registry);
//!
//! memories.store("Prefer rebase over merge", MemoryCategory::Preference, 0.8, vec![])?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local fastembed models; without it the
//!   registry degrades to a deterministic token-hash projection
//! - `vector-search` (default): USearch HNSW acceleration for unfiltered
//!   k-NN in the persistent store

// ============================================================================
// MODULES
// ============================================================================

pub mod cluster;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod enums;
pub mod error;
pub mod ghap;
pub mod git;
pub mod index;
pub mod journal;
pub mod memory;
pub mod metadata;
pub mod search;
pub mod store;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::Settings;
pub use error::{EngineError, Result};

pub use enums::{
    Axis, ConfidenceTier, Domain, Language, MemoryCategory, Outcome, SourceKind, Strategy,
    UnitType,
};

pub use embeddings::{
    cosine_similarity, EmbedderRole, EmbeddingError, EmbeddingRegistry, HashEmbedder,
    TextEmbedder, CODE_EMBEDDING_DIMENSIONS, SEMANTIC_EMBEDDING_DIMENSIONS,
};

pub use store::{
    Condition, Filter, MemoryVectorStore, Point, ScoredPoint, SqliteVectorStore, StoreError,
    VectorStore,
};

pub use metadata::{
    GhapFilter, GhapRecord, GitIndexState, IndexedFileRecord, MetadataError, MetadataStore,
    ProjectRecord, ValueRecord,
};

pub use index::{CodeIndexer, CodeUnit, IndexReport, CODE_UNITS_COLLECTION};

pub use git::{
    AuthorStats, ChurnHotspot, CommitInfo, GitAnalyzer, GitIndexReport, COMMITS_COLLECTION,
};

pub use ghap::{GhapEngine, GhapEntry, GhapStart, GhapUpdate, Resolution};

pub use cluster::{
    adaptive_params, cluster, validation_threshold, Cluster, ClusterParams, ClusterPoint,
    Clustering,
};

pub use search::{
    value_payload, CodeHit, CommitHit, ExperienceHit, MemoryHit, SearchOps, Searcher, ValueHit,
    VALUES_COLLECTION,
};

pub use context::{
    estimate_tokens, ContextAssembler, ContextBlock, ContextItem, ContextRequest,
};

pub use journal::SessionJournal;

pub use memory::{Memories, Memory, MEMORIES_COLLECTION};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
