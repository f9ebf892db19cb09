//! Embedding generation for vector retrieval.
//!
//! An [`EmbeddingBackend`] produces unit-norm vectors of a fixed
//! dimensionality; the [`Embedder`] front adds a per-process cache and
//! order-preserving batching on top of any backend. Identical input text
//! yields identical output within a process.

mod fallback;
mod openai;

pub use fallback::HashEmbedding;
pub use openai::OpenAiEmbedding;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, ProviderError, Result};

/// Default embedding dimensionality.
pub const DEFAULT_DIMENSIONS: usize = 768;

/// Default number of texts per provider call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// A single embedding with the provider-reported token count, when known.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// Unit-norm vector.
    pub vector: Vec<f32>,
    /// Tokens consumed by the provider, absent on cache hits.
    pub tokens: Option<usize>,
}

/// A batch of embeddings in input order.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// One vector per input text, in order.
    pub vectors: Vec<Vec<f32>>,
    /// Total tokens consumed by provider calls for this batch.
    pub total_tokens: usize,
}

/// Raw embedding producer.
///
/// Implementations must return unit-norm vectors of exactly
/// [`dimensions`](Self::dimensions) entries, one per input, in input order.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Vector dimensionality.
    fn dimensions(&self) -> usize;

    /// Embeds a batch of texts.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on provider failures.
    async fn embed_batch(&self, texts: &[String]) -> Result<BatchOutput>;
}

/// Caching, batching front over an [`EmbeddingBackend`].
pub struct Embedder {
    backend: Box<dyn EmbeddingBackend>,
    cache: Mutex<HashMap<String, Arc<Vec<f32>>>>,
    batch_size: usize,
}

impl Embedder {
    /// Wraps a backend with the default batch size.
    #[must_use]
    pub fn new(backend: Box<dyn EmbeddingBackend>) -> Self {
        Self::with_batch_size(backend, DEFAULT_BATCH_SIZE)
    }

    /// Wraps a backend with an explicit batch size.
    #[must_use]
    pub fn with_batch_size(backend: Box<dyn EmbeddingBackend>, batch_size: usize) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Vector dimensionality of the wrapped backend.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.backend.dimensions()
    }

    /// Embeds one text, serving repeats from the cache.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; fails on dimensionality mismatches.
    pub async fn embed(&self, text: &str) -> Result<EmbeddingOutput> {
        if let Some(vector) = self.cached(text) {
            return Ok(EmbeddingOutput {
                vector: vector.as_ref().clone(),
                tokens: None,
            });
        }
        let inputs = [text.to_string()];
        let batch = self.backend.embed_batch(&inputs).await?;
        let vector = batch
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| empty_batch_error(self.backend.name()))?;
        self.check_dimensions(&vector)?;
        self.store(text, &vector);
        Ok(EmbeddingOutput {
            vector,
            tokens: Some(batch.total_tokens),
        })
    }

    /// Embeds many texts, filling from the cache first and issuing provider
    /// calls in chunks of at most the configured batch size. Output order
    /// matches input order.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; fails on dimensionality mismatches.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<BatchOutput> {
        let mut vectors: Vec<Option<Vec<f32>>> = texts
            .iter()
            .map(|text| self.cached(text).map(|v| v.as_ref().clone()))
            .collect();
        let mut total_tokens = 0;

        let missing: Vec<usize> = (0..texts.len()).filter(|i| vectors[*i].is_none()).collect();
        for window in missing.chunks(self.batch_size) {
            let batch_texts: Vec<String> = window.iter().map(|i| texts[*i].clone()).collect();
            let batch = self.backend.embed_batch(&batch_texts).await?;
            if batch.vectors.len() != window.len() {
                return Err(empty_batch_error(self.backend.name()));
            }
            total_tokens += batch.total_tokens;
            for (slot, vector) in window.iter().zip(batch.vectors) {
                self.check_dimensions(&vector)?;
                self.store(&texts[*slot], &vector);
                vectors[*slot] = Some(vector);
            }
        }

        Ok(BatchOutput {
            vectors: vectors.into_iter().flatten().collect(),
            total_tokens,
        })
    }

    fn cached(&self, text: &str) -> Option<Arc<Vec<f32>>> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(text).cloned())
    }

    fn store(&self, text: &str, vector: &[f32]) {
        if let Ok(mut cache) = self.cache.lock() {
            // Duplicate fills are idempotent; last write wins.
            cache.insert(text.to_string(), Arc::new(vector.to_vec()));
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.dimensions() {
            Ok(())
        } else {
            Err(Error::Provider(ProviderError::DimensionMismatch {
                expected: self.dimensions(),
                actual: vector.len(),
            }))
        }
    }
}

fn empty_batch_error(backend: &str) -> Error {
    Error::Provider(ProviderError::ApiRequest {
        message: format!("{backend} returned a short embedding batch"),
    })
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 on length mismatch or zero magnitude. For unit-norm vectors
/// this equals the dot product.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
