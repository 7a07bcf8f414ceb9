//! # API Module
//!
//! Remote collaborators: text embedding and chat completion.
//!
//! The rest of the crate only sees the [`EmbeddingProvider`] and
//! [`ChatProvider`] traits. [`OpenAiProvider`] implements both against any
//! OpenAI-compatible endpoint using `async-openai`; tests substitute their own
//! implementations.
//!
//! Failures are folded into two kinds:
//! - [`ProviderError::RateLimited`]: HTTP 429, `rate_limit_*` or
//!   `insufficient_quota` error types.
//! - [`ProviderError::ProviderUnavailable`]: everything else (network, auth,
//!   malformed responses).
//!
//! No retry policy lives here beyond what the HTTP client itself does.
//!
//! # Example
//!
//! ```no_run
//! use olympiq::api::{ChatProvider, EmbeddingProvider, OpenAiProvider};
//! use olympiq::config::OlympiqConfig;
//!
//! # async fn demo(config: &OlympiqConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAiProvider::from_config(config);
//! let vector = provider.embed("Who won curling gold?").await?;
//! let answer = provider
//!     .complete("You answer questions.", "What is 2+2?", 0.0)
//!     .await?;
//! println!("{} dims, answer: {answer}", vector.len());
//! # Ok(()) }
//! ```

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
    },
};
use std::future::Future;
use tracing::{debug, warn};

use crate::config::OlympiqConfig;
use crate::error::ProviderError;

/// Turns text into an embedding vector.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send;
}

/// Turns a system prompt and a user message into an answer.
pub trait ChatProvider: Send + Sync {
    fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

impl<T: EmbeddingProvider> EmbeddingProvider for &T {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send {
        (**self).embed(text)
    }
}

impl<T: ChatProvider> ChatProvider for &T {
    fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send {
        (**self).complete(system_prompt, user_message, temperature)
    }
}

/// Creates a new OpenAI API client from configuration.
///
/// # Parameters
/// - `config: &OlympiqConfig`: Configuration containing API base and key.
///
/// # Returns
/// - `Client<OpenAIConfig>`: Client pointed at `config.api_base`.
pub fn create_client(config: &OlympiqConfig) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base.clone());
    debug!(api_base = %config.api_base, "client created");
    Client::with_config(openai_config)
}

/// Embedding and chat completion over one OpenAI-compatible client.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiProvider {
    pub fn new(
        client: Client<OpenAIConfig>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
        }
    }

    pub fn from_config(config: &OlympiqConfig) -> Self {
        Self::new(
            create_client(config),
            config.model.clone(),
            config.embedding_model.clone(),
        )
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.embedding_model.clone())
            .input(text.to_string())
            .build()
            .map_err(provider_error)?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(provider_error)?;

        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| ProviderError::ProviderUnavailable("empty embedding response".into()))
    }
}

impl ChatProvider for OpenAiProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt.to_string())
                .build()
                .map_err(provider_error)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_message.to_string())
                .build()
                .map_err(provider_error)?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.chat_model.clone())
            .temperature(temperature)
            .messages(messages)
            .build()
            .map_err(provider_error)?;

        debug!("Sending request: {:?}", request);

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(provider_error)?;

        let content: String = response
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .collect();

        if content.is_empty() {
            return Err(ProviderError::ProviderUnavailable(
                "chat completion returned no content".into(),
            ));
        }
        Ok(content)
    }
}

/// Classify an `async-openai` failure.
fn provider_error(err: OpenAIError) -> ProviderError {
    let mapped = match err {
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or_default();
            if kind.starts_with("rate_limit")
                || kind == "insufficient_quota"
                || api.message.to_ascii_lowercase().contains("rate limit")
            {
                ProviderError::RateLimited(api.message)
            } else {
                ProviderError::ProviderUnavailable(api.message)
            }
        }
        OpenAIError::Reqwest(e) if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) => {
            ProviderError::RateLimited(e.to_string())
        }
        other => ProviderError::ProviderUnavailable(other.to_string()),
    };
    warn!("provider call failed: {mapped}");
    mapped
}
