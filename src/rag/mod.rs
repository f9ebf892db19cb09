//! Grounded answer pipeline.
//!
//! Normalize → embed → retrieve → rerank → cite → build context →
//! synthesize → assess grounding. Synthesis uses the configured generation
//! provider under a strict grounding prompt and falls back to an answer
//! composed from the top citations when no provider is available or the
//! call fails.

pub mod prompt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::text::truncate_chars;
use crate::embedding::Embedder;
use crate::error::{Result, SearchError};
use crate::provider::{ChatRequest, LlmProvider, system_message, user_message};
use crate::rerank::{RerankedHit, Reranker};
use crate::search::SNIPPET_CHARS;
use crate::vector::{ChunkFilter, SearchParams, VectorStore};

/// Default retrieval breadth.
pub const DEFAULT_TOP_K: usize = 10;

/// Default generation budget in tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Synthesis sampling temperature.
const SYNTHESIS_TEMPERATURE: f32 = 0.1;

/// Number of reranked hits used for the context window.
const CONTEXT_HITS: usize = 5;

/// Number of citations composed into the fallback answer.
const FALLBACK_CITATIONS: usize = 3;

/// Grounding assessment weights and threshold.
const CITE_MARKER_WEIGHT: f32 = 0.3;
const HEADING_MENTION_WEIGHT: f32 = 0.2;
const INSUFFICIENT_BELOW: f32 = 0.3;

/// A grounded-answer request.
///
/// `max_tokens` and `k` are passed through unbounded; the transport layer
/// caps request size.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RagRequest {
    /// Free-text question.
    pub query: String,
    /// Equality filters forwarded to the vector store.
    #[serde(default)]
    pub filters: ChunkFilter,
    /// Generation budget override.
    #[serde(rename = "maxTokens")]
    pub max_tokens: Option<u32>,
    /// Retrieval breadth override.
    pub k: Option<usize>,
}

/// A source excerpt backing part of the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Source file relative to the corpus root.
    pub file: String,
    /// Section heading.
    pub heading: String,
    /// 1-based start line of the cited section.
    #[serde(rename = "lineStart")]
    pub line_start: usize,
    /// 1-based end line of the cited section.
    #[serde(rename = "lineEnd")]
    pub line_end: usize,
    /// Leading excerpt of the cited chunk, at most 300 characters.
    pub snippet: String,
    /// Relevance assigned by the rerank stage.
    pub relevance: f64,
}

/// A synthesized answer with its citations and grounding assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    /// Natural-language answer.
    pub answer: String,
    /// Citations in rerank order.
    pub citations: Vec<Citation>,
    /// Heuristic grounding estimate in `[0, 1]`.
    #[serde(rename = "groundingScore")]
    pub grounding_score: f32,
    /// `true` when the answer is insufficiently grounded.
    #[serde(rename = "insufficientEvidence")]
    pub insufficient_evidence: bool,
    /// Topics the corpus could not cover.
    #[serde(rename = "missingTopics", skip_serializing_if = "Option::is_none")]
    pub missing_topics: Option<Vec<String>>,
}

/// Retrieval and synthesis pipeline over the vector store.
pub struct RagPipeline {
    embedder: std::sync::Arc<Embedder>,
    store: std::sync::Arc<dyn VectorStore>,
    reranker: Reranker,
    provider: Option<Box<dyn LlmProvider>>,
    model: String,
    top_k: usize,
}

impl RagPipeline {
    /// Creates a pipeline. `provider` may be `None`, in which case answers
    /// are composed from citations.
    #[must_use]
    pub fn new(
        embedder: std::sync::Arc<Embedder>,
        store: std::sync::Arc<dyn VectorStore>,
        reranker: Reranker,
        provider: Option<Box<dyn LlmProvider>>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker,
            provider,
            model: model.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Overrides the default retrieval breadth.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Answers a query with citations grounded in retrieved chunks.
    ///
    /// # Errors
    ///
    /// Fails with [`SearchError::EmptyQuery`] before any I/O when the
    /// trimmed query is empty; otherwise propagates embedding and store
    /// errors.
    pub async fn query(&self, request: &RagRequest) -> Result<RagResponse> {
        let normalized = request.query.trim();
        if normalized.is_empty() {
            return Err(SearchError::EmptyQuery.into());
        }

        let embedding = self.embedder.embed(normalized).await?;
        let params = SearchParams::for_top_k(request.k.unwrap_or(self.top_k));
        let hits = self
            .store
            .search(&embedding.vector, params, &request.filters)
            .await?;
        if hits.is_empty() {
            return Ok(RagResponse {
                answer: "No relevant documentation found for this query.".to_string(),
                citations: Vec::new(),
                grounding_score: 0.0,
                insufficient_evidence: true,
                missing_topics: Some(vec![normalized.to_string()]),
            });
        }

        let reranked = self.reranker.rerank(normalized, hits).await;
        let citations: Vec<Citation> = reranked.iter().map(citation_for).collect();
        let context = build_context(&reranked);

        let answer = self
            .synthesize(&context, normalized, request.max_tokens)
            .await;

        let (grounding_score, insufficient_evidence) = assess_grounding(&answer, &citations);
        let missing_topics = if insufficient_evidence && !citations.is_empty() {
            Some(vec!["Additional context needed".to_string()])
        } else {
            None
        };

        Ok(RagResponse {
            answer,
            citations,
            grounding_score,
            insufficient_evidence,
            missing_topics,
        })
    }

    /// Provider synthesis with citation-composed fallback.
    async fn synthesize(&self, context: &str, question: &str, max_tokens: Option<u32>) -> String {
        if let Some(provider) = &self.provider {
            let request = ChatRequest {
                model: self.model.clone(),
                messages: vec![
                    system_message(prompt::GROUNDING_SYSTEM_PROMPT),
                    user_message(&prompt::build_user_prompt(context, question)),
                ],
                temperature: Some(SYNTHESIS_TEMPERATURE),
                max_tokens: Some(max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
            };
            match provider.chat(&request).await {
                Ok(response) if !response.content.trim().is_empty() => return response.content,
                Ok(_) => warn!("generation provider returned an empty answer"),
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "generation failed, composing from citations");
                }
            }
        }
        fallback_answer(context, question)
    }
}

fn citation_for(reranked: &RerankedHit) -> Citation {
    let metadata = &reranked.hit.chunk.metadata;
    Citation {
        file: metadata.file.clone(),
        heading: metadata.heading.clone(),
        line_start: metadata.line_start,
        line_end: metadata.line_end,
        snippet: truncate_chars(&reranked.hit.chunk.content, SNIPPET_CHARS).to_string(),
        relevance: reranked.rerank_score,
    }
}

/// Labels the top reranked hits as citation blocks for the prompt.
fn build_context(reranked: &[RerankedHit]) -> String {
    let mut context = String::new();
    for (i, entry) in reranked.iter().take(CONTEXT_HITS).enumerate() {
        let metadata = &entry.hit.chunk.metadata;
        context.push_str(&format!(
            "[Citation {}: {}, lines {}-{}]\nHeading: {}\n",
            i + 1,
            metadata.file,
            metadata.line_start,
            metadata.line_end,
            metadata.heading,
        ));
        if !metadata.release.is_empty() {
            context.push_str(&format!("Release: {}\n", metadata.release));
        }
        context.push_str(&format!("Content:\n{}\n\n---\n\n", entry.hit.chunk.content));
    }
    context
}

/// Composes an answer from the top citation blocks when no provider is
/// available. The wording deliberately avoids citation markers so the
/// grounding assessment reflects only how many cited headings it names.
fn fallback_answer(context: &str, question: &str) -> String {
    let mut parts = vec![format!(
        "Closest documentation excerpts for \"{question}\":"
    )];
    for block in context.split("\n\n---\n\n").take(FALLBACK_CITATIONS) {
        if block.trim().is_empty() {
            continue;
        }
        let heading = block
            .lines()
            .find_map(|line| line.strip_prefix("Heading: "))
            .unwrap_or("(untitled)");
        let source = block
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("[Citation "))
            .and_then(|line| line.split_once(": "))
            .map(|(_, rest)| rest.trim_end_matches(']').replace("lines ", "L"))
            .unwrap_or_default();
        let body = block
            .split_once("Content:\n")
            .map(|(_, content)| truncate_chars(content.trim(), SNIPPET_CHARS))
            .unwrap_or_default();
        parts.push(format!("{heading} ({source}): {body}"));
    }
    parts.join("\n\n")
}

/// Scores how visibly the answer acknowledges its sources.
fn assess_grounding(answer: &str, citations: &[Citation]) -> (f32, bool) {
    let mut score = 0.0;
    if answer.contains('[') || answer.contains("lines") {
        score += CITE_MARKER_WEIGHT;
    }
    let answer_lower = answer.to_lowercase();
    for citation in citations {
        if !citation.heading.is_empty()
            && answer_lower.contains(&citation.heading.to_lowercase())
        {
            score += HEADING_MENTION_WEIGHT;
        }
    }
    let score = score.min(1.0);
    (score, score < INSUFFICIENT_BELOW)
}
