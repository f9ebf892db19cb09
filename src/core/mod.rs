//! Core domain types for docrag.

mod chunk;
mod event;
mod fact;
mod section;
pub mod text;

pub use chunk::{ChunkMetadata, DocChunk};
pub use event::{DocEvent, EventBus};
pub use fact::{Fact, canonicalize, fact_hash, fact_key, hex_digest, normalize};
pub use section::{DocIndex, Section};
