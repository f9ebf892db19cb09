//! The service context: every request-surface operation behind one value.
//!
//! `DocService` threads the caches, stores, providers, agent, and watcher
//! together and is constructed once at startup; tests construct their own
//! per scenario. Remote providers initialize lazily, so operations that do
//! not need a credential keep working when one is absent.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chunking::{ChunkOptions, chunk_section};
use crate::config::ServiceConfig;
use crate::core::{DocChunk, EventBus};
use crate::embedding::{Embedder, EmbeddingBackend, HashEmbedding, OpenAiEmbedding};
use crate::error::{Error, Result, UpdateError};
use crate::facts::FactIndexCache;
use crate::index::{DocIndexCache, IndexOptions};
use crate::provider::create_provider;
use crate::rag::{RagPipeline, RagRequest, RagResponse};
use crate::rerank::Reranker;
use crate::search::{QueryCache, QueryKey, SearchFilters, SectionHit, score_sections};
use crate::update::{ApplyOutcome, DocUpdateAgent, UpdateAction, UpdateIntent, UpdateSuggestion};
use crate::vector::{ChunkFilter, SqliteVectorStore, VectorStore};
use crate::watch::DocWatcher;

/// One row of a search reply.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRow {
    /// Source file relative to the root.
    pub file: String,
    /// Section heading.
    pub heading: String,
    /// 1-based heading line.
    #[serde(rename = "lineStart")]
    pub line_start: usize,
    /// 1-based last section line.
    #[serde(rename = "lineEnd")]
    pub line_end: usize,
    /// Release token.
    pub release: String,
    /// Document type token.
    #[serde(rename = "docType")]
    pub doc_type: String,
    /// Lexical relevance score.
    pub score: f64,
    /// Why the section matched.
    #[serde(rename = "matchReasons")]
    pub match_reasons: Vec<String>,
    /// Leading content excerpt.
    pub snippet: String,
}

/// Search outcome: results, or the not-found sentinel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum SearchReply {
    /// Ranked sections.
    #[serde(rename = "ok")]
    Ok {
        /// Result rows, best first.
        results: Vec<SearchRow>,
    },
    /// The corpus has no sections, or nothing matched.
    #[serde(rename = "DOCS_NOT_FOUND")]
    NotFound {
        /// The query that found nothing.
        query: String,
    },
}

/// A grounded-answer request at the service surface.
#[derive(Debug, Clone, Default)]
pub struct AnswerRequest {
    /// Free-text question.
    pub query: String,
    /// Section filters; `doc_types` applies when it names one type.
    pub filters: SearchFilters,
    /// Generation budget override.
    pub max_tokens: Option<u32>,
    /// Retrieval breadth override.
    pub k: Option<usize>,
}

/// Best section per release for a feature.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseSummary {
    /// Release token.
    pub release: String,
    /// Best matching section, when any scored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best: Option<SearchRow>,
}

/// Reply for a cross-release feature comparison.
#[derive(Debug, Clone, Serialize)]
pub struct CompareReply {
    /// Compared feature text.
    pub feature: String,
    /// Per-release summaries in release order.
    pub releases: Vec<ReleaseSummary>,
}

/// Directed dependencies of one service within a release.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDeps {
    /// Service name as queried.
    pub service: String,
    /// Release scanned.
    pub release: String,
    /// Services that depend on this one.
    pub inbound: Vec<String>,
    /// Services this one depends on.
    pub outbound: Vec<String>,
    /// Raw dependency lines mentioning the service.
    #[serde(rename = "dataFlow", skip_serializing_if = "Option::is_none")]
    pub data_flow: Option<Vec<String>>,
}

/// Vector-store ingest report.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncReport {
    /// Files that contributed sections.
    pub files: usize,
    /// Sections chunked.
    pub sections: usize,
    /// Chunks upserted.
    pub chunks: usize,
    /// Tokens spent on embedding calls.
    pub tokens: usize,
}

/// Health report.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// Always `"ok"` while the process serves.
    pub status: &'static str,
    /// Exposed operations.
    pub tools: Vec<&'static str>,
    /// Seconds since the service was constructed.
    #[serde(rename = "uptimeSecs")]
    pub uptime_secs: u64,
}

/// Per-operation call counters.
#[derive(Debug, Default)]
struct ToolCallCounters {
    search: AtomicU64,
    answer: AtomicU64,
    suggest_update: AtomicU64,
    apply_update: AtomicU64,
    compare_releases: AtomicU64,
    service_dependencies: AtomicU64,
    refresh: AtomicU64,
    sync_vectors: AtomicU64,
}

/// Fixed-record metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    latency_total_ms: AtomicU64,
    tool_calls: ToolCallCounters,
}

/// Serializable snapshot of [`Metrics`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    /// Total operations served.
    pub requests: u64,
    /// Operations that returned an error.
    pub errors: u64,
    /// Mean latency over all operations, in milliseconds.
    #[serde(rename = "avgLatencyMs")]
    pub avg_latency_ms: f64,
    /// Per-operation counts.
    #[serde(rename = "toolCalls")]
    pub tool_calls: ToolCallsSnapshot,
}

/// Per-operation counts in a snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolCallsSnapshot {
    /// `search` calls.
    pub search: u64,
    /// `answer` calls.
    pub answer: u64,
    /// `suggest_update` calls.
    #[serde(rename = "suggestUpdate")]
    pub suggest_update: u64,
    /// `apply_update` calls.
    #[serde(rename = "applyUpdate")]
    pub apply_update: u64,
    /// `compare_releases` calls.
    #[serde(rename = "compareReleases")]
    pub compare_releases: u64,
    /// `service_dependencies` calls.
    #[serde(rename = "serviceDependencies")]
    pub service_dependencies: u64,
    /// `refresh` calls.
    pub refresh: u64,
    /// `sync_vectors` calls.
    #[serde(rename = "syncVectors")]
    pub sync_vectors: u64,
}

#[derive(Debug, Clone, Copy)]
enum ToolCall {
    Search,
    Answer,
    SuggestUpdate,
    ApplyUpdate,
    CompareReleases,
    ServiceDependencies,
    Refresh,
    SyncVectors,
}

impl Metrics {
    fn record(&self, op: ToolCall, started: Instant, ok: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.latency_total_ms.fetch_add(elapsed, Ordering::Relaxed);
        let counter = match op {
            ToolCall::Search => &self.tool_calls.search,
            ToolCall::Answer => &self.tool_calls.answer,
            ToolCall::SuggestUpdate => &self.tool_calls.suggest_update,
            ToolCall::ApplyUpdate => &self.tool_calls.apply_update,
            ToolCall::CompareReleases => &self.tool_calls.compare_releases,
            ToolCall::ServiceDependencies => &self.tool_calls.service_dependencies,
            ToolCall::Refresh => &self.tool_calls.refresh,
            ToolCall::SyncVectors => &self.tool_calls.sync_vectors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot of the counters.
    #[allow(clippy::cast_precision_loss)]
    fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_ms = self.latency_total_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests,
            errors: self.errors.load(Ordering::Relaxed),
            avg_latency_ms: if requests == 0 {
                0.0
            } else {
                total_ms as f64 / requests as f64
            },
            tool_calls: ToolCallsSnapshot {
                search: self.tool_calls.search.load(Ordering::Relaxed),
                answer: self.tool_calls.answer.load(Ordering::Relaxed),
                suggest_update: self.tool_calls.suggest_update.load(Ordering::Relaxed),
                apply_update: self.tool_calls.apply_update.load(Ordering::Relaxed),
                compare_releases: self.tool_calls.compare_releases.load(Ordering::Relaxed),
                service_dependencies: self
                    .tool_calls
                    .service_dependencies
                    .load(Ordering::Relaxed),
                refresh: self.tool_calls.refresh.load(Ordering::Relaxed),
                sync_vectors: self.tool_calls.sync_vectors.load(Ordering::Relaxed),
            },
        }
    }
}

/// The documentation retrieval and maintenance service.
pub struct DocService {
    config: ServiceConfig,
    index_cache: Arc<DocIndexCache>,
    fact_cache: Arc<FactIndexCache>,
    query_cache: Arc<QueryCache>,
    store: Arc<dyn VectorStore>,
    embedder: OnceCell<Arc<Embedder>>,
    pipeline: OnceCell<RagPipeline>,
    agent: DocUpdateAgent,
    events: EventBus,
    metrics: Metrics,
    answer_slots: Arc<Semaphore>,
    started_at: Instant,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<DocWatcher>>,
}

impl DocService {
    /// Creates the service over the SQLite vector store named in the
    /// configuration.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(&config.vector_db_path));
        Self::with_store(config, store)
    }

    /// Creates the service over an explicit vector store.
    #[must_use]
    pub fn with_store(config: ServiceConfig, store: Arc<dyn VectorStore>) -> Self {
        let index_cache = Arc::new(DocIndexCache::new());
        let fact_cache = Arc::new(FactIndexCache::new());
        let events = EventBus::new();
        let agent = DocUpdateAgent::new(
            config.root.clone(),
            Arc::clone(&index_cache),
            Arc::clone(&fact_cache),
            events.clone(),
            IndexOptions::default().with_ttl(config.cache_ttl),
        );
        let answer_slots = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            config,
            index_cache,
            fact_cache,
            query_cache: Arc::new(QueryCache::new()),
            store,
            embedder: OnceCell::new(),
            pipeline: OnceCell::new(),
            agent,
            events,
            metrics: Metrics::default(),
            answer_slots,
            started_at: Instant::now(),
            sweeper: Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    /// Starts background machinery: the index sweeper and, when enabled,
    /// the corpus watcher (whose reindex callback also drops the query
    /// cache).
    ///
    /// # Errors
    ///
    /// Returns an error when the watcher cannot be started.
    pub fn start(&self) -> Result<()> {
        if let Ok(mut sweeper) = self.sweeper.lock()
            && sweeper.is_none()
        {
            *sweeper = Some(Arc::clone(&self.index_cache).spawn_sweeper());
        }
        if self.config.watch_enabled {
            let query_cache = Arc::clone(&self.query_cache);
            let watcher = DocWatcher::new(
                self.config.root.clone(),
                Arc::clone(&self.index_cache),
                Arc::clone(&self.fact_cache),
                self.events.clone(),
            )
            .with_debounce(self.config.debounce)
            .with_on_reindex(Arc::new(move || {
                let query_cache = Arc::clone(&query_cache);
                Box::pin(async move {
                    query_cache.clear();
                })
            }));
            watcher.start()?;
            if let Ok(mut slot) = self.watcher.lock() {
                *slot = Some(watcher);
            }
        }
        info!(root = %self.config.root.display(), "service started");
        Ok(())
    }

    /// Stops the watcher and the sweeper and closes the vector store.
    pub async fn shutdown(&self) {
        if let Ok(mut slot) = self.watcher.lock()
            && let Some(watcher) = slot.take()
        {
            watcher.stop();
        }
        if let Ok(mut sweeper) = self.sweeper.lock()
            && let Some(handle) = sweeper.take()
        {
            handle.abort();
        }
        let _ = self.store.close().await;
        info!("service stopped");
    }

    /// Event bus for lifecycle notifications.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Ranked lexical search over the corpus, served through the query
    /// cache with concurrent-request deduplication.
    ///
    /// # Errors
    ///
    /// Fails on parse errors and on deduplicated fetch failures.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        max_results: usize,
    ) -> Result<SearchReply> {
        let started = Instant::now();
        let result = self.search_inner(query, filters, max_results).await;
        self.metrics.record(ToolCall::Search, started, result.is_ok());
        result
    }

    async fn search_inner(
        &self,
        query: &str,
        filters: &SearchFilters,
        max_results: usize,
    ) -> Result<SearchReply> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(crate::error::SearchError::EmptyQuery.into());
        }
        let index = self
            .index_cache
            .get(&self.config.root, self.index_options())
            .await?;
        if index.is_empty() {
            return Ok(SearchReply::NotFound {
                query: trimmed.to_string(),
            });
        }

        let key = QueryKey {
            fingerprint: index.fingerprint.clone(),
            query: trimmed.to_string(),
            release: filters.release.clone(),
            service: filters.service.clone(),
            doc_types: filters.doc_types.clone(),
            max_results: Some(max_results),
        };
        let owned_index = Arc::clone(&index);
        let owned_query = trimmed.to_string();
        let owned_filters = filters.clone();
        let hits = self
            .query_cache
            .get(&key, async move {
                Ok(score_sections(
                    &owned_index.sections,
                    &owned_query,
                    &owned_filters,
                    max_results,
                ))
            })
            .await?;

        if hits.is_empty() {
            return Ok(SearchReply::NotFound {
                query: trimmed.to_string(),
            });
        }
        Ok(SearchReply::Ok {
            results: hits.iter().map(search_row).collect(),
        })
    }

    /// Synthesizes a grounded answer with citations.
    ///
    /// # Errors
    ///
    /// Fails on empty queries, embedding configuration errors, and store
    /// failures.
    pub async fn answer(&self, request: &AnswerRequest) -> Result<RagResponse> {
        let started = Instant::now();
        let result = self.answer_inner(request).await;
        self.metrics.record(ToolCall::Answer, started, result.is_ok());
        result
    }

    async fn answer_inner(&self, request: &AnswerRequest) -> Result<RagResponse> {
        let _slot = self
            .answer_slots
            .acquire()
            .await
            .map_err(|_| Error::Cancelled)?;
        let pipeline = self.pipeline().await?;
        let rag_request = RagRequest {
            query: request.query.clone(),
            filters: chunk_filter(&request.filters),
            max_tokens: request.max_tokens,
            k: request.k,
        };
        pipeline.query(&rag_request).await
    }

    /// Parses, chunks, embeds, and upserts the corpus into the vector
    /// store.
    ///
    /// # Errors
    ///
    /// Fails on parse, embedding, or store errors.
    pub async fn sync_vectors(&self) -> Result<SyncReport> {
        let started = Instant::now();
        let result = self.sync_vectors_inner().await;
        self.metrics
            .record(ToolCall::SyncVectors, started, result.is_ok());
        result
    }

    async fn sync_vectors_inner(&self) -> Result<SyncReport> {
        let index = self
            .index_cache
            .get(&self.config.root, self.index_options())
            .await?;
        let options = ChunkOptions::default()
            .with_max_tokens(self.config.chunk_max_tokens)
            .with_overlap(self.config.chunk_overlap_tokens);
        let mut chunks: Vec<DocChunk> = Vec::new();
        for section in &index.sections {
            let service = service_tag(section);
            for mut chunk in chunk_section(section, &options) {
                chunk.metadata.service.clone_from(&service);
                chunks.push(chunk);
            }
        }
        if chunks.is_empty() {
            return Ok(SyncReport {
                files: index.file_count,
                sections: 0,
                chunks: 0,
                tokens: 0,
            });
        }
        let embedder = self.embedder().await?;
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batch = embedder.embed_batch(&texts).await?;
        self.store.connect().await?;
        self.store.upsert(&chunks, &batch.vectors).await?;
        debug!(chunks = chunks.len(), "vector sync complete");
        Ok(SyncReport {
            files: index.file_count,
            sections: index.sections.len(),
            chunks: chunks.len(),
            tokens: batch.total_tokens,
        })
    }

    /// Proposes a corpus edit with fact preflight.
    ///
    /// # Errors
    ///
    /// Propagates index build failures.
    pub async fn suggest_update(&self, intent: &UpdateIntent) -> Result<UpdateSuggestion> {
        let started = Instant::now();
        let result = self.agent.suggest_update(intent).await;
        self.metrics
            .record(ToolCall::SuggestUpdate, started, result.is_ok());
        result
    }

    /// Applies a previously suggested diff to `target_path`.
    ///
    /// Conflict and I/O failures surface as an error outcome rather than
    /// an `Err`, matching the transport contract.
    ///
    /// # Errors
    ///
    /// Propagates failures other than conflicts and write errors.
    pub async fn apply_update(
        &self,
        target_path: &Path,
        diff: &str,
        force: bool,
    ) -> Result<ApplyOutcome> {
        let started = Instant::now();
        let result = self.apply_update_inner(target_path, diff, force).await;
        self.metrics
            .record(ToolCall::ApplyUpdate, started, result.is_ok());
        result
    }

    async fn apply_update_inner(
        &self,
        target_path: &Path,
        diff: &str,
        force: bool,
    ) -> Result<ApplyOutcome> {
        let resolved = self.resolve_target(target_path)?;
        let action = if resolved.exists() {
            UpdateAction::Update
        } else {
            UpdateAction::Create
        };
        let suggestion = UpdateSuggestion {
            action,
            target_path: resolved.clone(),
            diff: diff.to_string(),
            rationale: String::new(),
            citations: Vec::new(),
            duplicates: Vec::new(),
            conflicts: Vec::new(),
            blocked: false,
        };
        match self.agent.apply_update(&suggestion, force).await {
            Ok(outcome) => Ok(outcome),
            Err(Error::Update(err @ UpdateError::Conflicts { .. })) => Ok(ApplyOutcome {
                status: "error",
                path: resolved,
                reindexed: false,
                error: Some(err.to_string()),
            }),
            Err(Error::Io(err)) => Ok(ApplyOutcome {
                status: "error",
                path: resolved,
                reindexed: false,
                error: Some(err.to_string()),
            }),
            Err(err) => Err(err),
        }
    }

    /// Summarizes how each release documents a feature.
    ///
    /// # Errors
    ///
    /// Propagates index build failures.
    pub async fn compare_releases(
        &self,
        feature: &str,
        releases: Option<Vec<String>>,
    ) -> Result<CompareReply> {
        let started = Instant::now();
        let result = self.compare_releases_inner(feature, releases).await;
        self.metrics
            .record(ToolCall::CompareReleases, started, result.is_ok());
        result
    }

    async fn compare_releases_inner(
        &self,
        feature: &str,
        releases: Option<Vec<String>>,
    ) -> Result<CompareReply> {
        let index = self
            .index_cache
            .get(&self.config.root, self.index_options())
            .await?;
        let releases = releases.unwrap_or_else(|| index.releases());
        let summaries = releases
            .into_iter()
            .map(|release| {
                let filters = SearchFilters {
                    release: Some(release.clone()),
                    ..SearchFilters::default()
                };
                let best = score_sections(&index.sections, feature, &filters, 1)
                    .first()
                    .map(search_row);
                ReleaseSummary { release, best }
            })
            .collect();
        Ok(CompareReply {
            feature: feature.to_string(),
            releases: summaries,
        })
    }

    /// Extracts inbound and outbound dependency edges for a service.
    ///
    /// # Errors
    ///
    /// Propagates index build failures.
    pub async fn service_dependencies(
        &self,
        service: &str,
        release: &str,
        include_data_flow: bool,
    ) -> Result<ServiceDeps> {
        let started = Instant::now();
        let result = self
            .service_dependencies_inner(service, release, include_data_flow)
            .await;
        self.metrics
            .record(ToolCall::ServiceDependencies, started, result.is_ok());
        result
    }

    async fn service_dependencies_inner(
        &self,
        service: &str,
        release: &str,
        include_data_flow: bool,
    ) -> Result<ServiceDeps> {
        static ARROW_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
            regex::Regex::new(r"([A-Za-z][\w.-]*)\s*(?:->|→|⇒)\s*([A-Za-z][\w.-]*)")
                .unwrap_or_else(|e| unreachable!("arrow regex: {e}"))
        });

        let index = self
            .index_cache
            .get(&self.config.root, self.index_options())
            .await?;
        let service_lower = service.to_lowercase();
        let mut inbound = Vec::new();
        let mut outbound = Vec::new();
        let mut data_flow = Vec::new();

        for section in index.sections.iter().filter(|s| s.release == release) {
            for line in section.content.lines() {
                let mut line_mentions = false;
                for captures in ARROW_RE.captures_iter(line) {
                    let source = &captures[1];
                    let target = &captures[2];
                    if target.to_lowercase() == service_lower {
                        push_unique(&mut inbound, source);
                        line_mentions = true;
                    }
                    if source.to_lowercase() == service_lower {
                        push_unique(&mut outbound, target);
                        line_mentions = true;
                    }
                }
                if line_mentions {
                    data_flow.push(line.trim().to_string());
                }
            }
        }

        Ok(ServiceDeps {
            service: service.to_string(),
            release: release.to_string(),
            inbound,
            outbound,
            data_flow: include_data_flow.then_some(data_flow),
        })
    }

    /// Invalidates every cache for the configured root.
    pub fn refresh(&self) {
        let started = Instant::now();
        self.index_cache.invalidate(&self.config.root);
        self.fact_cache.invalidate(&self.config.root);
        self.query_cache.clear();
        self.metrics.record(ToolCall::Refresh, started, true);
    }

    /// Liveness report.
    #[must_use]
    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            tools: vec![
                "search",
                "answer",
                "suggest_update",
                "apply_update",
                "compare_releases",
                "service_dependencies",
                "refresh",
                "healthz",
                "metrics",
            ],
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    /// Metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn index_options(&self) -> IndexOptions {
        IndexOptions::default().with_ttl(self.config.cache_ttl)
    }

    /// Rejects absolute targets escaping the root; resolves relative ones
    /// against it.
    fn resolve_target(&self, target: &Path) -> Result<PathBuf> {
        if target.is_absolute() {
            if target.starts_with(&self.config.root) {
                Ok(target.to_path_buf())
            } else {
                Err(Error::Update(UpdateError::TargetOutsideRoot {
                    path: target.to_path_buf(),
                }))
            }
        } else {
            Ok(self.config.root.join(target))
        }
    }

    /// Lazily constructs the configured embedder.
    async fn embedder(&self) -> Result<Arc<Embedder>> {
        self.embedder
            .get_or_try_init(|| async {
                let backend: Box<dyn EmbeddingBackend> =
                    match self.config.embedding_provider.as_str() {
                        "openai" => Box::new(OpenAiEmbedding::new(
                            self.config.api_key.clone(),
                            self.config.base_url.clone(),
                            self.config.embedding_model.clone(),
                            self.config.embedding_dimensions,
                        )?),
                        _ => Box::new(HashEmbedding::new(self.config.embedding_dimensions)),
                    };
                Ok(Arc::new(Embedder::new(backend)))
            })
            .await
            .cloned()
    }

    /// Lazily constructs the answer pipeline.
    async fn pipeline(&self) -> Result<&RagPipeline> {
        let embedder = self.embedder().await?;
        self.pipeline
            .get_or_try_init(|| async {
                let provider = if self.config.generation_enabled && self.config.api_key.is_some() {
                    Some(create_provider(
                        "openai",
                        self.config.api_key.clone(),
                        self.config.base_url.clone(),
                    )?)
                } else {
                    None
                };
                let reranker = if self.config.rerank_enabled {
                    Reranker::heuristic(self.config.rerank_top_k)
                } else {
                    Reranker::disabled()
                };
                Ok(RagPipeline::new(
                    embedder,
                    Arc::clone(&self.store),
                    reranker,
                    provider,
                    self.config.generation_model.clone(),
                )
                .with_top_k(self.config.top_k))
            })
            .await
    }
}

fn search_row(hit: &SectionHit) -> SearchRow {
    SearchRow {
        file: hit.section.file.clone(),
        heading: hit.section.heading.clone(),
        line_start: hit.section.line_start,
        line_end: hit.section.line_end,
        release: hit.section.release.clone(),
        doc_type: hit.section.doc_type.clone(),
        score: hit.score,
        match_reasons: hit.match_reasons.clone(),
        snippet: hit.snippet().to_string(),
    }
}

/// Service tag persisted on a section's vector rows.
///
/// Service-contract documents describe one service per section, so the
/// heading's leading token is the tag; other documents carry no tag.
fn service_tag(section: &crate::core::Section) -> String {
    if section.doc_type == "SERVICE_CONTRACTS" {
        section
            .heading
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase()
    } else {
        String::new()
    }
}

/// Maps section filters onto the vector row filter. A multi-valued
/// `doc_types` cannot be expressed as one equality and is dropped; the
/// service name is lowercased to match the persisted tag.
fn chunk_filter(filters: &SearchFilters) -> ChunkFilter {
    let doc_type = match filters.doc_types.as_deref() {
        Some([only]) => Some(only.clone()),
        Some(_) => {
            debug!("doc_types filter with multiple values is ignored for vector search");
            None
        }
        None => None,
    };
    ChunkFilter {
        release: filters.release.clone(),
        doc_type,
        service: filters.service.as_ref().map(|s| s.to_lowercase()),
        file: None,
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}
