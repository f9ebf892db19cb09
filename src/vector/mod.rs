//! Vector store adapter: an abstract chunk collection with upsert,
//! filtered cosine search, filtered delete, and row count.
//!
//! Two in-tree implementations back the trait: a persistent SQLite store
//! and an in-memory store. Remote HNSW-backed collections plug in behind
//! the same seam; [`SearchParams`] carries the `ef` they expect.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{ChunkMetadata, DocChunk};
use crate::error::Result;

/// Maximum id length accepted by the row schema.
pub const MAX_ID_CHARS: usize = 512;

/// Maximum stored content length; longer content is truncated on upsert.
pub const MAX_CONTENT_CHARS: usize = 65_535;

/// Floor for the HNSW `ef` search parameter.
pub const MIN_EF: usize = 64;

/// Search parameters passed to every store implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Number of hits to return.
    pub top_k: usize,
    /// HNSW search breadth; brute-force stores ignore it.
    pub ef: usize,
}

impl SearchParams {
    /// Builds parameters for a result count, with `ef = max(2·topK, 64)`.
    #[must_use]
    pub const fn for_top_k(top_k: usize) -> Self {
        let doubled = top_k * 2;
        Self {
            top_k,
            ef: if doubled > MIN_EF { doubled } else { MIN_EF },
        }
    }
}

/// Conjunctive equality filter over chunk scalar fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFilter {
    /// Release equality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// Document-type equality.
    #[serde(rename = "docType", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// Service equality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// File equality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ChunkFilter {
    /// Returns `true` when no predicate is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.release.is_none()
            && self.doc_type.is_none()
            && self.service.is_none()
            && self.file.is_none()
    }

    /// Evaluates the filter against row metadata.
    #[must_use]
    pub fn accepts(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(release) = &self.release
            && metadata.release != *release
        {
            return false;
        }
        if let Some(doc_type) = &self.doc_type
            && metadata.doc_type != *doc_type
        {
            return false;
        }
        if let Some(service) = &self.service
            && metadata.service != *service
        {
            return false;
        }
        if let Some(file) = &self.file
            && metadata.file != *file
        {
            return false;
        }
        true
    }

    /// Sets the release predicate.
    #[must_use]
    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    /// Sets the document-type predicate.
    #[must_use]
    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// Sets the service predicate.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the file predicate.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// A chunk returned from vector search with its similarity score.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// The matching chunk. `total_chunks` is not persisted and reads 0.
    pub chunk: DocChunk,
    /// Cosine similarity; higher is more relevant.
    pub score: f32,
}

impl VectorHit {
    /// Cosine distance of the hit.
    #[must_use]
    pub fn distance(&self) -> f32 {
        1.0 - self.score
    }
}

/// Row count statistics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreStats {
    /// Persisted row count.
    pub count: usize,
}

/// Abstract chunk collection.
///
/// Connections are long-lived: opened at first use and closed on process
/// shutdown. Every operation may be called concurrently.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Opens the connection and creates the collection when absent.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError`] on connection failures.
    async fn connect(&self) -> Result<()>;

    /// Inserts or replaces chunk rows with their embeddings.
    ///
    /// Content longer than [`MAX_CONTENT_CHARS`] is truncated.
    ///
    /// # Errors
    ///
    /// Fails when `chunks` and `embeddings` lengths differ.
    async fn upsert(&self, chunks: &[DocChunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Cosine-similarity search with a conjunctive equality filter.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError`] on query failures.
    async fn search(
        &self,
        vector: &[f32],
        params: SearchParams,
        filter: &ChunkFilter,
    ) -> Result<Vec<VectorHit>>;

    /// Deletes rows matching the filter, returning the removed count.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::StoreError::DeleteWithoutFilter`] when the
    /// filter has no predicate.
    async fn delete(&self, filter: &ChunkFilter) -> Result<usize>;

    /// Returns row counts.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError`] on query failures.
    async fn stats(&self) -> Result<StoreStats>;

    /// Releases the connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError`] on shutdown failures.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_params_ef_floor() {
        assert_eq!(SearchParams::for_top_k(5).ef, 64);
        assert_eq!(SearchParams::for_top_k(32).ef, 64);
        assert_eq!(SearchParams::for_top_k(33).ef, 66);
        assert_eq!(SearchParams::for_top_k(100).ef, 200);
    }

    #[test]
    fn test_filter_is_empty() {
        assert!(ChunkFilter::default().is_empty());
        assert!(!ChunkFilter::default().with_release("R1").is_empty());
    }

    #[test]
    fn test_filter_accepts_conjunction() {
        let metadata = ChunkMetadata {
            file: "R1-NOTES.md".to_string(),
            release: "R1".to_string(),
            doc_type: "NOTES".to_string(),
            service: "gateway".to_string(),
            ..ChunkMetadata::default()
        };
        let filter = ChunkFilter::default().with_release("R1").with_doc_type("NOTES");
        assert!(filter.accepts(&metadata));
        let filter = filter.clone().with_service("gateway");
        assert!(filter.accepts(&metadata));
        assert!(!filter.clone().with_service("billing").accepts(&metadata));
        let filter = filter.with_file("R2-NOTES.md");
        assert!(!filter.accepts(&metadata));
    }

    #[test]
    fn test_vector_hit_distance() {
        let hit = VectorHit {
            chunk: DocChunk::new(String::new(), ChunkMetadata::default()),
            score: 0.75,
        };
        assert!((hit.distance() - 0.25).abs() < f32::EPSILON);
    }
}
