//! `OpenAI` chat provider implementation using the `async-openai` crate.
//!
//! Compatible with any API that follows the `OpenAI` chat completion spec
//! via the base URL override.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_trait::async_trait;

use crate::error::{Error, ProviderError, Result};
use crate::provider::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, Role};

/// `OpenAI`-compatible chat provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ApiKeyMissing`] when `api_key` is `None`.
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
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
        })
    }

    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
        }
    }

    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();
        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let openai_request = Self::build_request(request);
        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| Error::Provider(ProviderError::from(e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();
        let total_tokens = response.usage.map(|u| u.total_tokens);

        Ok(ChatResponse {
            content,
            total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{system_message, user_message};

    #[test]
    fn test_convert_system_message() {
        let converted = OpenAiProvider::convert_message(&system_message("rules"));
        assert!(matches!(converted, ChatCompletionRequestMessage::System(_)));
    }

    #[test]
    fn test_convert_user_message() {
        let converted = OpenAiProvider::convert_message(&user_message("hello"));
        assert!(matches!(converted, ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn test_build_request_carries_limits() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![system_message("a"), user_message("b")],
            temperature: Some(0.1),
            max_tokens: Some(1024),
        };
        let built = OpenAiProvider::build_request(&request);
        assert_eq!(built.model, "gpt-4o-mini");
        assert_eq!(built.messages.len(), 2);
        assert_eq!(built.max_completion_tokens, Some(1024));
        assert!(built.temperature.is_some());
    }

    #[test]
    fn test_missing_key_fails() {
        assert!(OpenAiProvider::new(None, None).is_err());
    }
}
