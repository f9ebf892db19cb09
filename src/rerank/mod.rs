//! Candidate reranking.
//!
//! When enabled, candidates are re-ordered by a cross-relevance provider;
//! a lexical heuristic stands in when no provider is configured or the
//! provider call fails. When disabled, inputs pass through unsorted with
//! their retrieval score.

use async_trait::async_trait;
use tracing::error;

use crate::error::Result;
use crate::vector::VectorHit;

/// Default number of reranked results.
pub const DEFAULT_RERANK_TOP_K: usize = 6;

/// A provider-assigned relevance score for one input document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankResult {
    /// Index into the submitted document list.
    pub index: usize,
    /// Cross-relevance score; higher is better.
    pub score: f64,
}

/// Cross-encoder reranking backend.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Scores `documents` against `query`, returning up to `top_k`
    /// results in descending score order.
    ///
    /// # Errors
    ///
    /// Returns a provider error on API failures.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankResult>>;
}

/// A candidate with its rerank score attached.
#[derive(Debug, Clone)]
pub struct RerankedHit {
    /// The underlying retrieval hit.
    pub hit: VectorHit,
    /// Final relevance: provider score, heuristic score, or the original
    /// retrieval score on passthrough.
    pub rerank_score: f64,
}

/// Reranking stage configuration.
pub struct Reranker {
    provider: Option<Box<dyn RerankProvider>>,
    enabled: bool,
    top_k: usize,
}

impl Reranker {
    /// Passthrough reranker: inputs keep their retrieval scores.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            provider: None,
            enabled: false,
            top_k: DEFAULT_RERANK_TOP_K,
        }
    }

    /// Heuristic reranker without a remote provider.
    #[must_use]
    pub const fn heuristic(top_k: usize) -> Self {
        Self {
            provider: None,
            enabled: true,
            top_k,
        }
    }

    /// Provider-backed reranker, falling back to the heuristic on error.
    #[must_use]
    pub fn with_provider(provider: Box<dyn RerankProvider>, top_k: usize) -> Self {
        Self {
            provider: Some(provider),
            enabled: true,
            top_k,
        }
    }

    /// Re-orders candidates by cross-relevance.
    pub async fn rerank(&self, query: &str, hits: Vec<VectorHit>) -> Vec<RerankedHit> {
        if !self.enabled || hits.is_empty() {
            return hits
                .into_iter()
                .map(|hit| RerankedHit {
                    rerank_score: f64::from(hit.score),
                    hit,
                })
                .collect();
        }

        if let Some(provider) = &self.provider {
            let documents: Vec<String> = hits.iter().map(|h| h.chunk.content.clone()).collect();
            match provider.rerank(query, &documents, self.top_k).await {
                Ok(results) => return provider_order(results, hits, self.top_k),
                Err(err) => {
                    error!(provider = provider.name(), error = %err, "rerank failed, using heuristic");
                }
            }
        }

        heuristic_order(query, hits, self.top_k)
    }
}

/// Provider results in descending score order, backfilled from the
/// remaining inputs in original order when fewer than `top_k` came back.
fn provider_order(
    mut results: Vec<RerankResult>,
    hits: Vec<VectorHit>,
    top_k: usize,
) -> Vec<RerankedHit> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(top_k);

    let mut taken = vec![false; hits.len()];
    let mut ordered = Vec::with_capacity(top_k.min(hits.len()));
    for result in results {
        if let Some(hit) = hits.get(result.index)
            && !taken[result.index]
        {
            taken[result.index] = true;
            ordered.push(RerankedHit {
                hit: hit.clone(),
                rerank_score: result.score,
            });
        }
    }
    for (index, hit) in hits.iter().enumerate() {
        if ordered.len() >= top_k {
            break;
        }
        if !taken[index] {
            ordered.push(RerankedHit {
                hit: hit.clone(),
                rerank_score: f64::from(hit.score),
            });
        }
    }
    ordered
}

/// Lexical fallback: phrase and term presence damped by content length.
fn heuristic_order(query: &str, hits: Vec<VectorHit>, top_k: usize) -> Vec<RerankedHit> {
    let mut scored: Vec<RerankedHit> = hits
        .into_iter()
        .map(|hit| {
            let rerank_score = heuristic_score(query, &hit.chunk.content);
            RerankedHit { hit, rerank_score }
        })
        .collect();
    scored.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}

/// `(10·phrase + 1 per term) ÷ (ln(len+1) / 10)`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn heuristic_score(query: &str, content: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let content_lower = content.to_lowercase();

    let mut raw = if content_lower.contains(&query_lower) {
        10.0
    } else {
        0.0
    };
    raw += query_lower
        .split_whitespace()
        .filter(|term| content_lower.contains(*term))
        .count() as f64;

    let damping = ((content.len() + 1) as f64).ln() / 10.0;
    if damping > 0.0 { raw / damping } else { raw }
}
