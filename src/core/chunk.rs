//! Chunk representation for embedding and vector search.
//!
//! Chunks are bounded-size fragments of a [`Section`](super::Section),
//! prefixed with the section heading so each one is self-describing. They
//! are an intermediate product: persisted by the vector store, never
//! retained by the index.

use serde::{Deserialize, Serialize};

use crate::core::text::estimate_tokens;

/// A token-bounded fragment of a section, ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocChunk {
    /// Unique id: `<file>:<lineStart>-<lineEnd>:<chunkIndex>`.
    pub id: String,
    /// Chunk text; always begins with the section heading.
    pub content: String,
    /// Provenance and position metadata.
    pub metadata: ChunkMetadata,
    /// Estimated token count of `content`.
    pub tokens: usize,
}

/// Metadata carried by every chunk: all section fields plus the chunk's
/// position within its section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path relative to the corpus root.
    pub file: String,
    /// Release token.
    pub release: String,
    /// Document type token.
    #[serde(rename = "docType")]
    pub doc_type: String,
    /// Service tag for equality filtering; empty when the section is not
    /// tied to one service.
    #[serde(default)]
    pub service: String,
    /// Section heading.
    pub heading: String,
    /// 1-based line of the section heading.
    #[serde(rename = "lineStart")]
    pub line_start: usize,
    /// 1-based last line of the section.
    #[serde(rename = "lineEnd")]
    pub line_end: usize,
    /// 0-based position of this chunk within its section.
    #[serde(rename = "chunkIndex")]
    pub chunk_index: usize,
    /// Total number of chunks emitted for the section.
    #[serde(rename = "totalChunks")]
    pub total_chunks: usize,
}

impl DocChunk {
    /// Creates a chunk, deriving its id and token estimate.
    #[must_use]
    pub fn new(content: String, metadata: ChunkMetadata) -> Self {
        let tokens = estimate_tokens(&content);
        let id = chunk_id(
            &metadata.file,
            metadata.line_start,
            metadata.line_end,
            metadata.chunk_index,
        );
        Self {
            id,
            content,
            metadata,
            tokens,
        }
    }

    /// Returns the size of the chunk content in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Builds the stable chunk id for a section fragment.
#[must_use]
pub fn chunk_id(file: &str, line_start: usize, line_end: usize, chunk_index: usize) -> String {
    format!("{file}:{line_start}-{line_end}:{chunk_index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_schema() {
        assert_eq!(chunk_id("R1-NOTES.md", 3, 9, 1), "R1-NOTES.md:3-9:1");
    }

    #[test]
    fn test_new_derives_id_and_tokens() {
        let metadata = ChunkMetadata {
            file: "R1-NOTES.md".to_string(),
            release: "R1".to_string(),
            doc_type: "NOTES".to_string(),
            service: String::new(),
            heading: "Setup".to_string(),
            line_start: 1,
            line_end: 4,
            chunk_index: 0,
            total_chunks: 1,
        };
        let chunk = DocChunk::new("Setup\n\nRun the installer.".to_string(), metadata);
        assert_eq!(chunk.id, "R1-NOTES.md:1-4:0");
        assert_eq!(chunk.tokens, 7);
        assert_eq!(chunk.size(), 25);
    }

    #[test]
    fn test_metadata_serde_field_names() {
        let metadata = ChunkMetadata::default();
        let json = serde_json::to_value(&metadata).expect("serialize");
        assert!(json.get("chunkIndex").is_some());
        assert!(json.get("totalChunks").is_some());
        assert!(json.get("docType").is_some());
    }
}
