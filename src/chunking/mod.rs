//! Token-bounded, overlap-preserving section chunking.
//!
//! Sections small enough for one chunk pass through whole; larger sections
//! are split into segments that respect heading and code-fence boundaries,
//! then assembled greedily under the token budget with a tail overlap
//! carried into each following chunk. Every chunk's content begins with the
//! section heading so it stays self-describing after retrieval.

use crate::core::text::estimate_tokens;
use crate::core::{ChunkMetadata, DocChunk, Section};
use crate::parser::HEADING_RE;

/// Default token budget per chunk.
pub const DEFAULT_MAX_TOKENS: usize = 512;

/// Default overlap carried between consecutive chunks.
pub const DEFAULT_OVERLAP_TOKENS: usize = 50;

/// Blank lines only flush a segment once it has grown past this many lines.
const BLANK_FLUSH_MIN_LINES: usize = 10;

/// Chunking controls.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    /// Token budget per chunk (heading included).
    pub max_tokens: usize,
    /// Target overlap between consecutive chunks, in tokens.
    pub overlap_tokens: usize,
    /// Start a new segment at every Markdown heading.
    pub respect_headings: bool,
    /// Keep fenced code blocks intact within one segment.
    pub respect_code_fences: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap_tokens: DEFAULT_OVERLAP_TOKENS,
            respect_headings: true,
            respect_code_fences: true,
        }
    }
}

impl ChunkOptions {
    /// Sets the per-chunk token budget.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the overlap carried between chunks.
    #[must_use]
    pub const fn with_overlap(mut self, overlap_tokens: usize) -> Self {
        self.overlap_tokens = overlap_tokens;
        self
    }

    /// Enables or disables heading-boundary segmentation.
    #[must_use]
    pub const fn with_headings(mut self, respect: bool) -> Self {
        self.respect_headings = respect;
        self
    }

    /// Enables or disables code-fence preservation.
    #[must_use]
    pub const fn with_code_fences(mut self, respect: bool) -> Self {
        self.respect_code_fences = respect;
        self
    }
}

/// Splits a section into chunks under the configured token budget.
///
/// Always returns at least one chunk; `chunk_index` is contiguous from 0
/// and every chunk carries the same `total_chunks`.
#[must_use]
pub fn chunk_section(section: &Section, options: &ChunkOptions) -> Vec<DocChunk> {
    let body_tokens = estimate_tokens(&section.content);
    if body_tokens <= options.max_tokens {
        let chunk = DocChunk::new(
            format!("{}\n\n{}", section.heading, section.content),
            metadata(section, 0, 1),
        );
        return vec![chunk];
    }

    let segments = split_segments(&section.content, options);
    let bodies = assemble(&segments, estimate_tokens(&section.heading), options);
    let total = bodies.len();

    bodies
        .into_iter()
        .enumerate()
        .map(|(chunk_index, body)| {
            DocChunk::new(
                format!("{}\n\n{}", section.heading, body),
                metadata(section, chunk_index, total),
            )
        })
        .collect()
}

fn metadata(section: &Section, chunk_index: usize, total_chunks: usize) -> ChunkMetadata {
    ChunkMetadata {
        file: section.file.clone(),
        release: section.release.clone(),
        doc_type: section.doc_type.clone(),
        // Service tagging happens at ingest, where one is known.
        service: String::new(),
        heading: section.heading.clone(),
        line_start: section.line_start,
        line_end: section.line_end,
        chunk_index,
        total_chunks,
    }
}

/// Splits content into segments at heading, fence, and long-paragraph
/// boundaries. Segments are the atomic unit of chunk assembly; a fenced
/// block is never split across segments.
fn split_segments(content: &str, options: &ChunkOptions) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_fence = false;

    let mut flush = |current: &mut Vec<&str>, segments: &mut Vec<String>| {
        if !current.is_empty() {
            segments.push(current.join("\n"));
            current.clear();
        }
    };

    for line in content.lines() {
        let is_fence_marker = line.trim_start().starts_with("```");
        if is_fence_marker {
            if in_fence {
                current.push(line);
                in_fence = false;
                if options.respect_code_fences {
                    flush(&mut current, &mut segments);
                }
            } else {
                in_fence = true;
                current.push(line);
            }
        } else if in_fence {
            current.push(line);
        } else if options.respect_headings && HEADING_RE.is_match(line) {
            flush(&mut current, &mut segments);
            current.push(line);
        } else if line.trim().is_empty() && current.len() > BLANK_FLUSH_MIN_LINES {
            current.push(line);
            flush(&mut current, &mut segments);
        } else {
            current.push(line);
        }
    }
    flush(&mut current, &mut segments);
    segments
}

/// Greedy assembly of segments into chunk bodies, carrying a tail overlap
/// of whole segments into each subsequent chunk.
fn assemble(segments: &[String], heading_tokens: usize, options: &ChunkOptions) -> Vec<String> {
    let mut bodies = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0;

    for segment in segments {
        let segment_tokens = estimate_tokens(segment);
        if !current.is_empty()
            && heading_tokens + current_tokens + segment_tokens > options.max_tokens
        {
            bodies.push(current.join("\n"));
            let (overlap, overlap_tokens) = tail_overlap(&current, options.overlap_tokens);
            current = overlap;
            current_tokens = overlap_tokens;
        }
        current.push(segment);
        current_tokens += segment_tokens;
    }
    if !current.is_empty() {
        bodies.push(current.join("\n"));
    }
    bodies
}

/// Walks backwards over an emitted chunk's segments, pulling whole segments
/// while their combined estimate stays within the overlap budget.
fn tail_overlap<'a>(emitted: &[&'a str], overlap_tokens: usize) -> (Vec<&'a str>, usize) {
    let mut overlap = Vec::new();
    let mut total = 0;
    for segment in emitted.iter().rev() {
        let tokens = estimate_tokens(segment);
        if total + tokens > overlap_tokens {
            break;
        }
        total += tokens;
        overlap.push(*segment);
    }
    overlap.reverse();
    (overlap, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(content: &str) -> Section {
        Section {
            file: "R1-NOTES.md".to_string(),
            release: "R1".to_string(),
            doc_type: "NOTES".to_string(),
            heading: "Setup".to_string(),
            content: content.to_string(),
            line_start: 1,
            line_end: 1 + content.lines().count(),
        }
    }

    #[test]
    fn test_small_section_single_chunk() {
        let s = section("Install the binary.");
        let chunks = chunk_section(&s, &ChunkOptions::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Setup\n\nInstall the binary.");
        assert_eq!(chunks[0].metadata.chunk_index, 0);
        assert_eq!(chunks[0].metadata.total_chunks, 1);
        assert_eq!(chunks[0].id, "R1-NOTES.md:1-2:0");
    }

    #[test]
    fn test_exactly_max_tokens_single_chunk() {
        // 128 chars estimate to exactly 32 tokens.
        let body = "x".repeat(128);
        let s = section(&body);
        let options = ChunkOptions::default().with_max_tokens(32);
        let chunks = chunk_section(&s, &options);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_large_section_splits_with_heading_prefix() {
        let body = (0..120)
            .map(|i| format!("paragraph line {i} with some filler text"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let s = section(&body);
        let options = ChunkOptions::default().with_max_tokens(64).with_overlap(8);
        let chunks = chunk_section(&s, &options);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.content.starts_with("Setup\n\n"));
            assert_eq!(chunk.metadata.chunk_index, i);
            assert_eq!(chunk.metadata.total_chunks, chunks.len());
        }
    }

    #[test]
    fn test_ids_unique_and_schema() {
        let body = (0..80)
            .map(|i| format!("line {i} abcdefghijklmnopqrstuvwxyz"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let s = section(&body);
        let options = ChunkOptions::default().with_max_tokens(48).with_overlap(0);
        let chunks = chunk_section(&s, &options);
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
        assert!(chunks[1].id.ends_with(":1"));
    }

    #[test]
    fn test_overlap_repeats_tail_segment() {
        // Four heading-rooted segments of six tokens each; the heading
        // "Setup" adds two. A 16-token budget fits two segments per chunk,
        // and an 8-token overlap carries exactly one segment forward.
        let body = (0..4)
            .map(|i| format!("### S{i}\n0123456789abcdef"))
            .collect::<Vec<_>>()
            .join("\n");
        let s = section(&body);
        let options = ChunkOptions::default().with_max_tokens(16).with_overlap(8);
        let chunks = chunk_section(&s, &options);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].content.contains("### S1"));
        assert!(chunks[1].content.contains("### S1"));
        assert!(chunks[1].content.contains("### S2"));
        assert!(chunks[2].content.contains("### S2"));
    }

    #[test]
    fn test_code_fence_kept_whole() {
        let fence = "```rust\nfn main() {\n    run();\n}\n```";
        let filler = (0..40)
            .map(|i| format!("filler sentence number {i} for padding"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let s = section(&format!("{filler}\n{fence}\n{filler}"));
        let options = ChunkOptions::default().with_max_tokens(64).with_overlap(0);
        let chunks = chunk_section(&s, &options);
        let carriers: Vec<&DocChunk> = chunks
            .iter()
            .filter(|c| c.content.contains("fn main()"))
            .collect();
        for carrier in &carriers {
            assert!(carrier.content.contains("```rust"));
            assert!(carrier.content.matches("```").count() >= 2);
        }
        assert!(!carriers.is_empty());
    }

    #[test]
    fn test_heading_starts_new_segment() {
        let content = "intro text\n### Sub\nbody under sub";
        let segments = split_segments(content, &ChunkOptions::default());
        assert_eq!(segments.len(), 2);
        assert!(segments[1].starts_with("### Sub"));
    }

    #[test]
    fn test_blank_line_flushes_long_segment() {
        let long: Vec<String> = (0..12).map(|i| format!("l{i}")).collect();
        let content = format!("{}\n\nafter", long.join("\n"));
        let segments = split_segments(&content, &ChunkOptions::default());
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1], "after");
    }

    #[test]
    fn test_empty_body_still_one_chunk() {
        let s = section("");
        let chunks = chunk_section(&s, &ChunkOptions::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Setup\n\n");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn chunk_indices_contiguous(
                lines in proptest::collection::vec("[a-z ]{0,60}", 1..80),
                max_tokens in 16usize..128,
                overlap in 0usize..12,
            ) {
                let s = section(&lines.join("\n"));
                let options = ChunkOptions::default()
                    .with_max_tokens(max_tokens)
                    .with_overlap(overlap);
                let chunks = chunk_section(&s, &options);
                prop_assert!(!chunks.is_empty());
                for (i, chunk) in chunks.iter().enumerate() {
                    prop_assert_eq!(chunk.metadata.chunk_index, i);
                    prop_assert_eq!(chunk.metadata.total_chunks, chunks.len());
                    prop_assert!(chunk.content.starts_with("Setup\n\n"));
                }
            }
        }
    }
}
