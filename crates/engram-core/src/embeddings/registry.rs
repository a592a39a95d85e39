//! Embedding Registry
//!
//! Process-wide pair of embedders with a one-shot-init lifecycle: the
//! registry is constructed once, hands out the same `Arc` on every request,
//! and never swaps an embedder after first observation.
//!
//! The heavy numeric runtime behind the local models is incompatible with
//! forking after initialization. Construct the registry (and trigger the
//! first embed) only inside the daemon's final process; the daemon spawns,
//! it does not fork-then-initialize.

use std::sync::Arc;

use super::{
    HashEmbedder, TextEmbedder, CODE_EMBEDDING_DIMENSIONS, SEMANTIC_EMBEDDING_DIMENSIONS,
};

/// Which of the two embedders a caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedderRole {
    /// Fast, lower-dimension embedder for code units
    Code,
    /// Higher-quality embedder for memories, commits and experiences
    Semantic,
}

/// Registry of the two process-wide embedders
#[derive(Clone)]
pub struct EmbeddingRegistry {
    code: Arc<dyn TextEmbedder>,
    semantic: Arc<dyn TextEmbedder>,
}

impl EmbeddingRegistry {
    /// Registry backed by the local models (or, without the `embeddings`
    /// feature, by the deterministic fallback at the same dimensions)
    pub fn local() -> Self {
        #[cfg(feature = "embeddings")]
        {
            Self {
                code: Arc::new(super::LocalEmbedder::code()),
                semantic: Arc::new(super::LocalEmbedder::semantic()),
            }
        }
        #[cfg(not(feature = "embeddings"))]
        {
            Self::deterministic()
        }
    }

    /// Registry backed by the deterministic token-hash embedders; used by
    /// tests and no-model builds
    pub fn deterministic() -> Self {
        Self {
            code: Arc::new(HashEmbedder::new(
                "engram/hash-code",
                CODE_EMBEDDING_DIMENSIONS,
            )),
            semantic: Arc::new(HashEmbedder::new(
                "engram/hash-semantic",
                SEMANTIC_EMBEDDING_DIMENSIONS,
            )),
        }
    }

    /// Registry over caller-provided embedders
    pub fn with_embedders(code: Arc<dyn TextEmbedder>, semantic: Arc<dyn TextEmbedder>) -> Self {
        Self { code, semantic }
    }

    /// The code embedder; the same instance on every call
    pub fn code(&self) -> Arc<dyn TextEmbedder> {
        self.code.clone()
    }

    /// The semantic embedder; the same instance on every call
    pub fn semantic(&self) -> Arc<dyn TextEmbedder> {
        self.semantic.clone()
    }

    /// Embedder for a role
    pub fn for_role(&self, role: EmbedderRole) -> Arc<dyn TextEmbedder> {
        match role {
            EmbedderRole::Code => self.code(),
            EmbedderRole::Semantic => self.semantic(),
        }
    }
}

impl std::fmt::Debug for EmbeddingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingRegistry")
            .field("code", &self.code.name())
            .field("semantic", &self.semantic.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_request_returns_the_same_instance() {
        let registry = EmbeddingRegistry::deterministic();
        let a = registry.code();
        let b = registry.code();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn dimensions_are_declared_without_loading() {
        let registry = EmbeddingRegistry::deterministic();
        assert_eq!(registry.code().dimension(), CODE_EMBEDDING_DIMENSIONS);
        assert_eq!(registry.semantic().dimension(), SEMANTIC_EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn roles_map_to_distinct_embedders() {
        let registry = EmbeddingRegistry::deterministic();
        assert_ne!(
            registry.for_role(EmbedderRole::Code).dimension(),
            registry.for_role(EmbedderRole::Semantic).dimension()
        );
    }
}
