//! Deterministic Fallback Embedder
//!
//! Projects text into a fixed-dimension vector by hashing word tokens and
//! character trigrams into buckets, then L2-normalizing. No model download,
//! no randomness: the same text always produces the same vector, and texts
//! sharing vocabulary land close in cosine space. Used when the `embeddings`
//! feature is off and by the test harness.

use super::{l2_normalize, EmbeddingError, TextEmbedder};

/// Weight of a whole-token feature
const TOKEN_WEIGHT: f32 = 1.0;

/// Weight of a character-trigram feature
const TRIGRAM_WEIGHT: f32 = 0.4;

/// Deterministic token-hash projection embedder
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    name: String,
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder with the given declared dimension
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
        }
    }

    fn project(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in tokenize(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += TOKEN_WEIGHT;

            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let tri: String = window.iter().collect();
                    let bucket = (fnv1a(tri.as_bytes()) % self.dimension as u64) as usize;
                    vector[bucket] += TRIGRAM_WEIGHT;
                }
            }
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl TextEmbedder for HashEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "text cannot be empty".to_string(),
            ));
        }
        Ok(self.project(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Lowercased alphanumeric tokens
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// FNV-1a 64-bit hash
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[test]
    fn deterministic() {
        let embedder = HashEmbedder::new("test", 64);
        let a = embedder.embed("prefer rebase over merge").unwrap();
        let b = embedder.embed("prefer rebase over merge").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn declared_dimension_is_respected() {
        let embedder = HashEmbedder::new("test", 128);
        let v = embedder.embed("hello world").unwrap();
        assert_eq!(v.len(), 128);
        assert_eq!(embedder.dimension(), 128);
    }

    #[test]
    fn shared_vocabulary_lands_closer() {
        let embedder = HashEmbedder::new("test", 256);
        let base = embedder.embed("merge strategy for feature branches").unwrap();
        let related = embedder.embed("prefer rebase over merge").unwrap();
        let unrelated = embedder.embed("tokio runtime worker threads").unwrap();

        assert!(cosine_similarity(&base, &related) > cosine_similarity(&base, &unrelated));
    }

    #[test]
    fn empty_text_is_rejected() {
        let embedder = HashEmbedder::new("test", 64);
        assert!(matches!(
            embedder.embed("   "),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[test]
    fn batch_preserves_order() {
        let embedder = HashEmbedder::new("test", 64);
        let batch = embedder.embed_batch(&["alpha", "beta"]).unwrap();
        assert_eq!(batch[0], embedder.embed("alpha").unwrap());
        assert_eq!(batch[1], embedder.embed("beta").unwrap());
    }
}
