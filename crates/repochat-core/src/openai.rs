//! Client for OpenAI-compatible `/chat/completions` endpoints (Groq, OpenAI, vLLM, ...).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{Completer, CompletionError, Message};

#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One non-streaming chat request. No retries.
    pub async fn chat(&self, messages: &[Message]) -> Result<String, OpenAiError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OpenAiError::RateLimited);
        }
        if !status.is_success() {
            tracing::error!(%status, body = %text, "chat completion request failed");
            return Err(OpenAiError::Status(status.as_u16()));
        }
        parse_reply(&text)
    }
}

impl Completer for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        self.chat(messages)
            .await
            .map_err(CompletionError::from)
    }
}

fn parse_reply(body: &str) -> Result<String, OpenAiError> {
    let resp: ChatResponse = serde_json::from_str(body)?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(OpenAiError::EmptyResponse)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rate limited")]
    RateLimited,
    #[error("completion endpoint returned status {0}")]
    Status(u16),
    #[error("completion response had no content")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_has_openai_shape() {
        let messages = vec![Message::system("sys"), Message::user("q")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "q");
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"It parses."}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "It parses.");
    }

    #[test]
    fn empty_choices_is_an_error() {
        assert!(matches!(
            parse_reply(r#"{"choices":[]}"#),
            Err(OpenAiError::EmptyResponse)
        ));
        assert!(matches!(
            parse_reply(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(OpenAiError::EmptyResponse)
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let c = OpenAiClient::new("https://api.groq.com/openai/v1/", "secret", "m");
        assert!(!format!("{c:?}").contains("secret"));
        assert_eq!(c.base_url, "https://api.groq.com/openai/v1");
    }
}
