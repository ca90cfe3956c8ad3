//! Ollama client for embeddings and chat completion. Wraps ollama-rs with a simple API.

use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use thiserror::Error;

use crate::config::{DEFAULT_EMBED_MODEL, DEFAULT_OLLAMA_CHAT_MODEL, DEFAULT_OLLAMA_URL};
use crate::embed::{EmbedError, Embedder};
use crate::llm::{Completer, CompletionError, Message, Role};

/// Thin wrapper around Ollama for embedding and completion.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
    chat_model: String,
}

impl OllamaClient {
    /// Create from URL string, e.g. `http://localhost:11434`.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_OLLAMA_CHAT_MODEL.to_string(),
        })
    }

    /// Create with default localhost:11434.
    pub fn local() -> Result<Self, OllamaError> {
        Self::from_url(DEFAULT_OLLAMA_URL)
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    /// Set the chat model used by [`Completer::complete`].
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Embed a single string. Returns the embedding vector.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, OllamaError> {
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Single(text.to_string()),
        );
        let res = self.inner.generate_embeddings(req).await?;
        res.embeddings
            .into_iter()
            .next()
            .ok_or(OllamaError::EmptyResponse)
    }

    /// Embed multiple strings in one call. Returns one embedding per input.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );
        let res = self.inner.generate_embeddings(req).await?;
        if res.embeddings.len() != texts.len() {
            return Err(OllamaError::CountMismatch {
                expected: texts.len(),
                got: res.embeddings.len(),
            });
        }
        Ok(res.embeddings)
    }

    /// Non-streaming chat with the configured chat model.
    pub async fn chat(&self, messages: &[Message]) -> Result<String, OllamaError> {
        let messages = messages.iter().map(convert_message).collect();
        let req = ChatMessageRequest::new(self.chat_model.clone(), messages);
        let res = self.inner.send_chat_messages(req).await?;
        Ok(res.message.content)
    }
}

impl Embedder for OllamaClient {
    fn model_id(&self) -> &str {
        &self.embed_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_one(text)
            .await
            .map_err(EmbedError::from)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.embed_many(texts)
            .await
            .map_err(EmbedError::from)
    }
}

impl Completer for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        self.chat(messages)
            .await
            .map_err(CompletionError::from)
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    match msg.role {
        Role::System => ChatMessage::system(msg.content.clone()),
        Role::User => ChatMessage::user(msg.content.clone()),
        Role::Assistant => ChatMessage::assistant(msg.content.clone()),
    }
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
    #[error("Ollama returned no embedding")]
    EmptyResponse,
    #[error("Ollama returned {got} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}
