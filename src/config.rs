//! Service configuration with builder pattern and environment support.
//!
//! Configuration resolves in order: explicit values → environment
//! variables (`DOCRAG_*`, plus `OPENAI_API_KEY`/`OPENAI_BASE_URL` for
//! provider credentials) → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default cache TTL in milliseconds.
const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
/// Default watcher debounce in milliseconds.
const DEFAULT_DEBOUNCE_MS: u64 = 1000;
/// Default embedding dimensionality.
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
/// Default embedding model for the `openai` provider.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default generation model.
const DEFAULT_GENERATION_MODEL: &str = "gpt-4o-mini";
/// Default retrieval breadth for answers.
const DEFAULT_TOP_K: usize = 10;
/// Default rerank depth.
const DEFAULT_RERANK_TOP_K: usize = 6;
/// Default concurrent answer pipelines.
const DEFAULT_MAX_CONCURRENCY: usize = 10;
/// Default chunk budget in tokens.
const DEFAULT_CHUNK_MAX_TOKENS: usize = 512;
/// Default chunk overlap in tokens.
const DEFAULT_CHUNK_OVERLAP_TOKENS: usize = 50;

/// Configuration for the documentation service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Corpus root directory.
    pub root: PathBuf,
    /// TTL for the section index cache.
    pub cache_ttl: Duration,
    /// Whether the file watcher starts with the service.
    pub watch_enabled: bool,
    /// Watcher debounce window.
    pub debounce: Duration,
    /// SQLite file backing the vector store.
    pub vector_db_path: PathBuf,
    /// Embedding provider: `"hash"` (local, deterministic) or `"openai"`.
    pub embedding_provider: String,
    /// Embedding model name for remote providers.
    pub embedding_model: String,
    /// Embedding dimensionality.
    pub embedding_dimensions: usize,
    /// Generation model; answers fall back to citations when the provider
    /// is unavailable.
    pub generation_model: String,
    /// Whether answer synthesis may call the generation provider.
    pub generation_enabled: bool,
    /// Whether reranking is enabled (heuristic unless a provider is wired).
    pub rerank_enabled: bool,
    /// Rerank depth.
    pub rerank_top_k: usize,
    /// Retrieval breadth for answers.
    pub top_k: usize,
    /// Maximum concurrent answer pipelines.
    pub max_concurrency: usize,
    /// Chunk token budget.
    pub chunk_max_tokens: usize,
    /// Chunk overlap in tokens.
    pub chunk_overlap_tokens: usize,
    /// Provider API key.
    pub api_key: Option<String>,
    /// Provider base URL override.
    pub base_url: Option<String>,
}

impl ServiceConfig {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Builds configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no corpus root is configured.
    pub fn from_env() -> Result<Self> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    root: Option<PathBuf>,
    cache_ttl_ms: Option<u64>,
    watch_enabled: Option<bool>,
    debounce_ms: Option<u64>,
    vector_db_path: Option<PathBuf>,
    embedding_provider: Option<String>,
    embedding_model: Option<String>,
    embedding_dimensions: Option<usize>,
    generation_model: Option<String>,
    generation_enabled: Option<bool>,
    rerank_enabled: Option<bool>,
    rerank_top_k: Option<usize>,
    top_k: Option<usize>,
    max_concurrency: Option<usize>,
    chunk_max_tokens: Option<usize>,
    chunk_overlap_tokens: Option<usize>,
    api_key: Option<String>,
    base_url: Option<String>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl ServiceConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.root.is_none() {
            self.root = std::env::var("DOCRAG_ROOT").ok().map(PathBuf::from);
        }
        if self.cache_ttl_ms.is_none() {
            self.cache_ttl_ms = env_parse("DOCRAG_CACHE_TTL_MS");
        }
        if self.watch_enabled.is_none() {
            self.watch_enabled = env_parse("DOCRAG_WATCH");
        }
        if self.debounce_ms.is_none() {
            self.debounce_ms = env_parse("DOCRAG_DEBOUNCE_MS");
        }
        if self.vector_db_path.is_none() {
            self.vector_db_path = std::env::var("DOCRAG_VECTOR_DB").ok().map(PathBuf::from);
        }
        if self.embedding_provider.is_none() {
            self.embedding_provider = std::env::var("DOCRAG_EMBEDDING_PROVIDER").ok();
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("DOCRAG_EMBEDDING_MODEL").ok();
        }
        if self.embedding_dimensions.is_none() {
            self.embedding_dimensions = env_parse("DOCRAG_EMBEDDING_DIMENSIONS");
        }
        if self.generation_model.is_none() {
            self.generation_model = std::env::var("DOCRAG_GENERATION_MODEL").ok();
        }
        if self.generation_enabled.is_none() {
            self.generation_enabled = env_parse("DOCRAG_GENERATION");
        }
        if self.rerank_enabled.is_none() {
            self.rerank_enabled = env_parse("DOCRAG_RERANK");
        }
        if self.rerank_top_k.is_none() {
            self.rerank_top_k = env_parse("DOCRAG_RERANK_TOP_K");
        }
        if self.top_k.is_none() {
            self.top_k = env_parse("DOCRAG_TOP_K");
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = env_parse("DOCRAG_MAX_CONCURRENCY");
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("DOCRAG_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("DOCRAG_BASE_URL"))
                .ok();
        }
        self
    }

    /// Sets the corpus root.
    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Sets the cache TTL in milliseconds.
    #[must_use]
    pub const fn cache_ttl_ms(mut self, ttl: u64) -> Self {
        self.cache_ttl_ms = Some(ttl);
        self
    }

    /// Enables or disables the watcher.
    #[must_use]
    pub const fn watch_enabled(mut self, enabled: bool) -> Self {
        self.watch_enabled = Some(enabled);
        self
    }

    /// Sets the watcher debounce in milliseconds.
    #[must_use]
    pub const fn debounce_ms(mut self, debounce: u64) -> Self {
        self.debounce_ms = Some(debounce);
        self
    }

    /// Sets the vector database path.
    #[must_use]
    pub fn vector_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.vector_db_path = Some(path.into());
        self
    }

    /// Sets the embedding provider name.
    #[must_use]
    pub fn embedding_provider(mut self, provider: impl Into<String>) -> Self {
        self.embedding_provider = Some(provider.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the embedding dimensionality.
    #[must_use]
    pub const fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = Some(dimensions);
        self
    }

    /// Sets the generation model.
    #[must_use]
    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = Some(model.into());
        self
    }

    /// Enables or disables generation.
    #[must_use]
    pub const fn generation_enabled(mut self, enabled: bool) -> Self {
        self.generation_enabled = Some(enabled);
        self
    }

    /// Enables or disables reranking.
    #[must_use]
    pub const fn rerank_enabled(mut self, enabled: bool) -> Self {
        self.rerank_enabled = Some(enabled);
        self
    }

    /// Sets the retrieval breadth.
    #[must_use]
    pub const fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Sets the answer concurrency limit.
    #[must_use]
    pub const fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the provider base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Finalizes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no corpus root was provided.
    pub fn build(self) -> Result<ServiceConfig> {
        let Some(root) = self.root else {
            return Err(Error::Config {
                message: "corpus root is required (set DOCRAG_ROOT or --root)".to_string(),
            });
        };
        let vector_db_path = self
            .vector_db_path
            .unwrap_or_else(|| root.join(".docrag").join("vectors.db"));
        Ok(ServiceConfig {
            root,
            cache_ttl: Duration::from_millis(self.cache_ttl_ms.unwrap_or(DEFAULT_CACHE_TTL_MS)),
            watch_enabled: self.watch_enabled.unwrap_or(true),
            debounce: Duration::from_millis(self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            vector_db_path,
            embedding_provider: self.embedding_provider.unwrap_or_else(|| "hash".to_string()),
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimensions: self
                .embedding_dimensions
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
            generation_model: self
                .generation_model
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            generation_enabled: self.generation_enabled.unwrap_or(true),
            rerank_enabled: self.rerank_enabled.unwrap_or(true),
            rerank_top_k: self.rerank_top_k.unwrap_or(DEFAULT_RERANK_TOP_K),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY).max(1),
            chunk_max_tokens: self.chunk_max_tokens.unwrap_or(DEFAULT_CHUNK_MAX_TOKENS),
            chunk_overlap_tokens: self
                .chunk_overlap_tokens
                .unwrap_or(DEFAULT_CHUNK_OVERLAP_TOKENS),
            api_key: self.api_key,
            base_url: self.base_url,
        })
    }
}
