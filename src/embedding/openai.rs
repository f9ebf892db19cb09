//! `OpenAI`-compatible embedding backend using the `async-openai` crate.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequest, EmbeddingInput};
use async_trait::async_trait;

use crate::embedding::{BatchOutput, EmbeddingBackend};
use crate::error::{Error, ProviderError, Result};

/// Embedding backend for any `OpenAI`-compatible embeddings API.
pub struct OpenAiEmbedding {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedding {
    /// Creates a backend.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ApiKeyMissing`] when `api_key` is `None`,
    /// so a missing credential fails at first use of the provider.
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self> {
        let Some(api_key) = api_key else {
            return Err(Error::Provider(ProviderError::ApiKeyMissing {
                provider: "openai".to_string(),
            }));
        };
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Ok(Self {
            client: Client::with_config(config),
            model: model.into(),
            dimensions,
        })
    }
}

impl std::fmt::Debug for OpenAiEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedding")
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbedding {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn embed_batch(&self, texts: &[String]) -> Result<BatchOutput> {
        let request = CreateEmbeddingRequest {
            model: self.model.clone(),
            input: EmbeddingInput::StringArray(texts.to_vec()),
            dimensions: Some(self.dimensions as u32),
            ..Default::default()
        };
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| Error::Provider(ProviderError::from(e)))?;

        let mut data = response.data;
        // Responses may arrive out of index order.
        data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        Ok(BatchOutput {
            vectors,
            total_tokens: response.usage.total_tokens as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_fails_fast() {
        let result = OpenAiEmbedding::new(None, None, "text-embedding-3-small", 768);
        assert!(matches!(
            result,
            Err(Error::Provider(ProviderError::ApiKeyMissing { .. }))
        ));
    }

    #[test]
    fn test_construction_with_key() {
        let backend =
            OpenAiEmbedding::new(Some("test-key".to_string()), None, "text-embedding-3-small", 768)
                .expect("backend");
        assert_eq!(backend.dimensions(), 768);
        assert_eq!(backend.name(), "openai");
    }
}
