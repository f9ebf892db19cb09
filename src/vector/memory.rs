//! In-memory vector store for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::DocChunk;
use crate::core::text::truncate_chars;
use crate::embedding::cosine_similarity;
use crate::error::{Error, Result, StoreError};
use crate::vector::{
    ChunkFilter, MAX_CONTENT_CHARS, SearchParams, StoreStats, VectorHit, VectorStore,
};

struct Row {
    chunk: DocChunk,
    embedding: Vec<f32>,
}

/// Process-local chunk collection with brute-force cosine search.
#[derive(Default)]
pub struct MemoryVectorStore {
    rows: Mutex<HashMap<String, Row>>,
}

impl MemoryVectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, chunks: &[DocChunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Store(StoreError::UpsertMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            }));
        }
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| Error::Store(StoreError::NotConnected))?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let mut stored = chunk.clone();
            stored.content = truncate_chars(&stored.content, MAX_CONTENT_CHARS).to_string();
            rows.insert(
                stored.id.clone(),
                Row {
                    chunk: stored,
                    embedding: embedding.clone(),
                },
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        params: SearchParams,
        filter: &ChunkFilter,
    ) -> Result<Vec<VectorHit>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| Error::Store(StoreError::NotConnected))?;
        let mut hits: Vec<VectorHit> = rows
            .values()
            .filter(|row| filter.accepts(&row.chunk.metadata))
            .map(|row| {
                let mut chunk = row.chunk.clone();
                // Not persisted by the row schema.
                chunk.metadata.total_chunks = 0;
                VectorHit {
                    chunk,
                    score: cosine_similarity(vector, &row.embedding),
                }
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(params.top_k);
        Ok(hits)
    }

    async fn delete(&self, filter: &ChunkFilter) -> Result<usize> {
        if filter.is_empty() {
            return Err(Error::Store(StoreError::DeleteWithoutFilter));
        }
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| Error::Store(StoreError::NotConnected))?;
        let before = rows.len();
        rows.retain(|_, row| !filter.accepts(&row.chunk.metadata));
        Ok(before - rows.len())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| Error::Store(StoreError::NotConnected))?;
        Ok(StoreStats { count: rows.len() })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChunkMetadata;

    fn chunk(file: &str, release: &str, index: usize, content: &str) -> DocChunk {
        DocChunk::new(
            content.to_string(),
            ChunkMetadata {
                file: file.to_string(),
                release: release.to_string(),
                doc_type: "NOTES".to_string(),
                service: String::new(),
                heading: "H".to_string(),
                line_start: 1,
                line_end: 2,
                chunk_index: index,
                total_chunks: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_upsert_and_ranked_search() {
        let store = MemoryVectorStore::new();
        store
            .upsert(
                &[chunk("R1-A.md", "R1", 0, "a"), chunk("R1-B.md", "R1", 0, "b")],
                &[vec![1.0, 0.0], vec![0.5, 0.5]],
            )
            .await
            .expect("upsert");
        let hits = store
            .search(&[1.0, 0.0], SearchParams::for_top_k(2), &ChunkFilter::default())
            .await
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].chunk.metadata.file, "R1-A.md");
        assert_eq!(hits[0].chunk.metadata.total_chunks, 0);
    }

    #[tokio::test]
    async fn test_service_filter_matches_tagged_rows() {
        let store = MemoryVectorStore::new();
        let mut tagged = chunk("R1-A.md", "R1", 0, "a");
        tagged.metadata.service = "gateway".to_string();
        store
            .upsert(
                &[tagged, chunk("R1-B.md", "R1", 0, "b")],
                &[vec![1.0], vec![1.0]],
            )
            .await
            .expect("upsert");
        let filter = ChunkFilter::default().with_service("gateway");
        let hits = store
            .search(&[1.0], SearchParams::for_top_k(5), &filter)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.metadata.service, "gateway");
        // Untagged rows never match a service predicate.
        let none = store
            .search(
                &[1.0],
                SearchParams::for_top_k(5),
                &ChunkFilter::default().with_service("billing"),
            )
            .await
            .expect("search");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_filter() {
        let store = MemoryVectorStore::new();
        store
            .upsert(
                &[chunk("R1-A.md", "R1", 0, "a"), chunk("R2-B.md", "R2", 0, "b")],
                &[vec![1.0], vec![1.0]],
            )
            .await
            .expect("upsert");
        let removed = store
            .delete(&ChunkFilter::default().with_release("R1"))
            .await
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(store.stats().await.expect("stats").count, 1);
        assert!(
            store.delete(&ChunkFilter::default()).await.is_err(),
            "empty filter must be rejected"
        );
    }
}
