//! Deterministic hash-based embedding backend.
//!
//! Feature-hashes each text into a fixed-width vector: whole words carry
//! the primary signal, short character windows add fuzzy overlap, and the
//! result is normalized to unit length. This measures lexical overlap, not
//! semantics; it is strictly a fallback for when no remote embedding
//! provider is configured.

use async_trait::async_trait;
use rayon::prelude::*;

use crate::core::text::estimate_tokens;
use crate::embedding::{BatchOutput, EmbeddingBackend};
use crate::error::Result;

/// FNV-1a offset basis.
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
/// FNV-1a prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Weight of a whole-word feature.
const WORD_WEIGHT: f32 = 1.0;
/// Weight of a character-window feature.
const WINDOW_WEIGHT: f32 = 0.25;
/// Each feature also lands in a second slot at this fraction of its
/// weight, so single-slot collisions degrade gracefully.
const ECHO_SCALE: f32 = 0.5;
/// Width of the character windows hashed for fuzzy overlap.
const WINDOW_CHARS: usize = 4;

/// Hash-based embedding backend.
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    /// Creates a backend with the given dimensionality.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn fnv1a(bytes: &[u8]) -> u64 {
        let mut hash = FNV_OFFSET;
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    /// Adds one feature to the vector: a signed primary slot plus a
    /// half-weight echo slot drawn from the upper hash bits.
    #[allow(clippy::cast_possible_truncation)]
    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = Self::fnv1a(feature.as_bytes());
        let signed = if hash & 1 == 0 { weight } else { -weight };
        let primary = (hash as usize) % self.dimensions;
        let echo = ((hash >> 27) as usize) % self.dimensions;
        vector[primary] += signed;
        vector[echo] += signed * ECHO_SCALE;
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();
        // Collapse separators so punctuation never shifts the windows.
        let cleaned = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

        for word in cleaned.split_whitespace() {
            self.accumulate(&mut vector, word, WORD_WEIGHT);
        }

        let chars: Vec<char> = cleaned.chars().collect();
        for window in chars.windows(WINDOW_CHARS) {
            let feature: String = window.iter().collect();
            self.accumulate(&mut vector, &feature, WINDOW_WEIGHT);
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbedding {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<BatchOutput> {
        let vectors: Vec<Vec<f32>> = texts.par_iter().map(|text| self.vector_for(text)).collect();
        let total_tokens = texts.iter().map(|text| estimate_tokens(text)).sum();
        Ok(BatchOutput {
            vectors,
            total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_fnv1a_known_values() {
        // Published FNV-1a test vectors.
        assert_eq!(HashEmbedding::fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(HashEmbedding::fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let backend = HashEmbedding::new(64);
        let a = backend.embed_batch(&["hello world".to_string()]).await.expect("a");
        let b = backend.embed_batch(&["hello world".to_string()]).await.expect("b");
        assert_eq!(a.vectors, b.vectors);
    }

    #[tokio::test]
    async fn test_unit_norm() {
        let backend = HashEmbedding::new(64);
        let batch = backend
            .embed_batch(&["normalize me please".to_string()])
            .await
            .expect("batch");
        let magnitude: f32 = batch.vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_lexical_overlap_scores_higher() {
        let backend = HashEmbedding::new(256);
        let batch = backend
            .embed_batch(&[
                "the quick brown fox".to_string(),
                "the quick brown dog".to_string(),
                "entirely unrelated words".to_string(),
            ])
            .await
            .expect("batch");
        let near = cosine_similarity(&batch.vectors[0], &batch.vectors[1]);
        let far = cosine_similarity(&batch.vectors[0], &batch.vectors[2]);
        assert!(near > far, "expected {near} > {far}");
    }

    #[tokio::test]
    async fn test_case_and_punctuation_insensitive() {
        let backend = HashEmbedding::new(128);
        let batch = backend
            .embed_batch(&["Cache, Invalidation!".to_string(), "cache invalidation".to_string()])
            .await
            .expect("batch");
        let similarity = cosine_similarity(&batch.vectors[0], &batch.vectors[1]);
        assert!(similarity > 0.99, "expected near-identity, got {similarity}");
    }

    #[tokio::test]
    async fn test_empty_text_zero_vector() {
        let backend = HashEmbedding::new(32);
        let batch = backend.embed_batch(&[String::new()]).await.expect("batch");
        assert!(batch.vectors[0].iter().all(|&x| x == 0.0));
    }
}
