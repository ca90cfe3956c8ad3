//! Test-only embedder and completer.

use std::sync::{Arc, Mutex};

use crate::embed::{EmbedError, Embedder};
use crate::llm::{Completer, CompletionError, Message};

pub const MOCK_DIMENSION: usize = 64;

/// Deterministic bag-of-words embedder: each lowercase word bumps one hashed bucket.
/// Texts sharing words land close together, which is enough to test retrieval.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub model: String,
    pub dimension: usize,
    pub fail: bool,
    calls: Arc<Mutex<usize>>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            model: "mock-embed".into(),
            dimension: MOCK_DIMENSION,
            fail: false,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn with_model(mut self, model: &str, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % self.dimension;
            v[bucket] += 1.0;
        }
        v
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl Embedder for MockEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if self.fail {
            return Err(EmbedError::backend("mock embedding error"));
        }
        *self.calls.lock().unwrap() += 1;
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if self.fail {
            return Err(EmbedError::backend("mock embedding error"));
        }
        *self.calls.lock().unwrap() += texts.len();
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Returns scripted replies in order, then a default. Records every request.
#[derive(Debug, Clone)]
pub struct MockCompleter {
    responses: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
    pub default_response: String,
    pub fail: bool,
}

impl MockCompleter {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock answer".into(),
            fail: false,
        }
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Completer for MockCompleter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        if self.fail {
            return Err(CompletionError::backend("mock completion error"));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}
