//! Provider-agnostic chat types and the LLM provider seam.
//!
//! The answer-synthesis step talks to a generation provider through
//! [`LlmProvider`]; implementations translate these types into
//! provider-specific SDK calls so the pipeline stays decoupled from any
//! particular vendor.

mod openai;

pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ProviderError, Result};

/// Role of a chat message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Message content.
    pub content: String,
}

/// A chat completion request (provider-agnostic).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

/// A chat completion response (provider-agnostic).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated text content.
    pub content: String,
    /// Total tokens used, when reported.
    pub total_tokens: Option<u32>,
}

/// Creates a system message.
#[must_use]
pub fn system_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::System,
        content: content.to_string(),
    }
}

/// Creates a user message.
#[must_use]
pub fn user_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::User,
        content: content.to_string(),
    }
}

/// Trait for LLM generation backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on API failures or timeouts.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Creates an [`LlmProvider`] for the given provider name.
///
/// # Errors
///
/// Returns [`ProviderError::Unsupported`] for unknown names and
/// [`ProviderError::ApiKeyMissing`] when no credential is available.
pub fn create_provider(
    provider: &str,
    api_key: Option<String>,
    base_url: Option<String>,
) -> Result<Box<dyn LlmProvider>> {
    match provider {
        "openai" => Ok(Box::new(OpenAiProvider::new(api_key, base_url)?)),
        other => Err(Error::Provider(ProviderError::Unsupported {
            name: other.to_string(),
        })),
    }
}
