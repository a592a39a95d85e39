//! Local Embedding Models
//!
//! fastembed-backed ONNX inference, fully local. Two models:
//!
//! - code: all-MiniLM-L6-v2 (384d) — small and fast, good enough for code
//!   unit retrieval
//! - semantic: nomic-embed-text-v1.5 (768d) — higher quality for memories,
//!   commit messages and experience axes
//!
//! Each model lives in a process-wide `OnceLock` and is initialized exactly
//! once, on first embed. Model init pulls in the ONNX runtime, which is not
//! fork-safe: the daemon must be running in its final process before the
//! first embed call.

use std::sync::{Mutex, MutexGuard, OnceLock};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{
    truncate_for_embedding, EmbedderRole, EmbeddingError, TextEmbedder, BATCH_SIZE,
    CODE_EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH, SEMANTIC_EMBEDDING_DIMENSIONS,
};
use crate::config::model_cache_dir;

/// Model identifier of the code embedder
pub const CODE_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Model identifier of the semantic embedder
pub const SEMANTIC_MODEL_NAME: &str = "nomic-ai/nomic-embed-text-v1.5";

static CODE_MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();
static SEMANTIC_MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn init_model(model: EmbeddingModel) -> Result<Mutex<TextEmbedding>, String> {
    let cache_dir = model_cache_dir();
    if let Err(e) = std::fs::create_dir_all(&cache_dir) {
        tracing::warn!("failed to create model cache directory {:?}: {}", cache_dir, e);
    }

    let options = InitOptions::new(model)
        .with_show_download_progress(false)
        .with_cache_dir(cache_dir);

    TextEmbedding::try_new(options)
        .map(Mutex::new)
        .map_err(|e| e.to_string())
}

fn get_model(role: EmbedderRole) -> Result<MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let (cell, model, name) = match role {
        EmbedderRole::Code => (&CODE_MODEL, EmbeddingModel::AllMiniLML6V2, CODE_MODEL_NAME),
        EmbedderRole::Semantic => (
            &SEMANTIC_MODEL,
            EmbeddingModel::NomicEmbedTextV15,
            SEMANTIC_MODEL_NAME,
        ),
    };

    let result = cell.get_or_init(|| init_model(model));

    match result {
        Ok(mutex) => mutex.lock().map_err(|e| EmbeddingError::ModelInit {
            model: name.to_string(),
            cause: format!("lock poisoned: {}", e),
        }),
        Err(cause) => Err(EmbeddingError::ModelInit {
            model: name.to_string(),
            cause: cause.clone(),
        }),
    }
}

/// A lazily loaded local embedding model
#[derive(Debug, Clone, Copy)]
pub struct LocalEmbedder {
    role: EmbedderRole,
}

impl LocalEmbedder {
    /// The fast code embedder (384d)
    pub fn code() -> Self {
        Self {
            role: EmbedderRole::Code,
        }
    }

    /// The quality semantic embedder (768d)
    pub fn semantic() -> Self {
        Self {
            role: EmbedderRole::Semantic,
        }
    }
}

impl TextEmbedder for LocalEmbedder {
    fn name(&self) -> &str {
        match self.role {
            EmbedderRole::Code => CODE_MODEL_NAME,
            EmbedderRole::Semantic => SEMANTIC_MODEL_NAME,
        }
    }

    fn dimension(&self) -> usize {
        match self.role {
            EmbedderRole::Code => CODE_EMBEDDING_DIMENSIONS,
            EmbedderRole::Semantic => SEMANTIC_EMBEDDING_DIMENSIONS,
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "text cannot be empty".to_string(),
            ));
        }

        let mut model = get_model(self.role)?;
        let text = truncate_for_embedding(text, MAX_TEXT_LENGTH);

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings.into_iter().next().ok_or_else(|| {
            EmbeddingError::EmbeddingFailed("model returned no embedding".to_string())
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = get_model(self.role)?;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let truncated: Vec<&str> = chunk
                .iter()
                .map(|t| truncate_for_embedding(t, MAX_TEXT_LENGTH))
                .collect();

            let embeddings = model
                .embed(truncated, None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }
}
