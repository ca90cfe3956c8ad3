//! Chat messages and the completion seam shared by every LLM backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::config::{CompletionBackend, ConfigError, Settings, API_KEY_VARS};
use crate::embed::BoxError;
use crate::ollama::{OllamaClient, OllamaError};
use crate::openai::{OpenAiClient, OpenAiError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error(transparent)]
    OpenAi(#[from] OpenAiError),
    #[error(transparent)]
    Ollama(#[from] OllamaError),
    #[error("{0}")]
    Backend(#[source] BoxError),
}

impl CompletionError {
    /// Wraps an error from any other completion backend, keeping it as the source.
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }
}

/// Stateless text completion over an ordered message list.
pub trait Completer: Send + Sync {
    fn name(&self) -> &str;

    /// Send messages and return the assistant's reply (non-streaming).
    fn complete(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<String, CompletionError>> + Send;
}

/// The completion backend picked at start-up from [`Settings`].
#[derive(Debug, Clone)]
pub enum AnyCompleter {
    OpenAi(OpenAiClient),
    Ollama(OllamaClient),
}

impl AnyCompleter {
    /// Builds the configured backend. Fails when its credential is missing.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let config = &settings.config;
        match config.completion_backend {
            CompletionBackend::Openai => {
                let key = settings
                    .api_key()
                    .ok_or(ConfigError::MissingCredential(API_KEY_VARS[0]))?;
                Ok(Self::OpenAi(OpenAiClient::new(
                    &config.completion_base_url,
                    key,
                    settings.completion_model(),
                )))
            }
            CompletionBackend::Ollama => {
                let client = OllamaClient::from_url(&config.ollama_url)
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "ollama_url".into(),
                        value: config.ollama_url.clone(),
                    })?
                    .with_chat_model(settings.completion_model());
                Ok(Self::Ollama(client))
            }
        }
    }
}

impl Completer for AnyCompleter {
    fn name(&self) -> &str {
        match self {
            Self::OpenAi(c) => c.name(),
            Self::Ollama(c) => c.name(),
        }
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        match self {
            Self::OpenAi(c) => c.complete(messages).await,
            Self::Ollama(c) => c.complete(messages).await,
        }
    }
}
