//! # docrag
//!
//! Grounded documentation retrieval for coding agents.
//!
//! docrag indexes a multi-release corpus of Markdown documents, serves
//! ranked section search and citation-grounded answers, and maintains the
//! corpus through fact-checked updates.
//!
//! ## Features
//!
//! - **Section indexing**: fingerprinted, TTL-cached heading-level parse
//!   of `R<digits>-<DOCTYPE>.md` documents
//! - **Hybrid retrieval**: lexical scoring with a deduplicating query
//!   cache, plus embeddings over a pluggable vector store
//! - **Grounded answers**: retrieve → rerank → synthesize with traceable
//!   citations and a grounding assessment
//! - **Fact-checked updates**: subject/predicate/object extraction with
//!   duplicate and conflict preflight before any write

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod chunking;
pub mod cli;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod facts;
pub mod index;
pub mod parser;
pub mod provider;
pub mod rag;
pub mod rerank;
pub mod search;
pub mod service;
pub mod update;
pub mod vector;
pub mod watch;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{ChunkMetadata, DocChunk, DocEvent, DocIndex, EventBus, Fact, Section};

// Re-export configuration
pub use config::{ServiceConfig, ServiceConfigBuilder};

// Re-export the service surface
pub use service::{AnswerRequest, DocService, Health, MetricsSnapshot, SearchReply, SyncReport};

// Re-export retrieval building blocks
pub use chunking::{ChunkOptions, chunk_section};
pub use embedding::{Embedder, EmbeddingBackend, HashEmbedding, cosine_similarity};
pub use index::{DocIndexCache, IndexOptions};
pub use rag::{Citation, RagPipeline, RagRequest, RagResponse};
pub use rerank::{RerankProvider, Reranker};
pub use search::{QueryCache, QueryKey, SearchFilters, SectionHit, score_sections};
pub use vector::{ChunkFilter, MemoryVectorStore, SqliteVectorStore, VectorStore};

// Re-export maintenance types
pub use facts::{FactIndex, FactIndexCache};
pub use update::{DocUpdateAgent, UpdateIntent, UpdateSuggestion};
pub use watch::DocWatcher;
