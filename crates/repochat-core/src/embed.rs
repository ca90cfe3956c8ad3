//! The embedding seam: text in, fixed-dimension vector out.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::ollama::OllamaError;

/// Boxed error from a backend that has no variant of its own.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error(transparent)]
    Ollama(#[from] OllamaError),
    #[error("model {model} returned an empty vector")]
    EmptyVector { model: String },
    #[error("expected {expected} vectors of {dimension} dimensions")]
    Shape { expected: usize, dimension: usize },
    #[error("{0}")]
    Backend(#[source] BoxError),
}

impl EmbedError {
    /// Wraps an error from any other embedding backend, keeping it as the source.
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }
}

/// Maps text to vectors. Every vector from one embedder has the same length.
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors (recorded per namespace).
    fn model_id(&self) -> &str;

    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, EmbedError>> + Send;

    /// Embed many strings. Returns one vector per input, in input order.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, EmbedError>> + Send;
}

/// The vector space a namespace was built in: model and dimensionality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSpace {
    pub model: String,
    pub dimension: usize,
}

impl EmbeddingSpace {
    /// Probes `embedder` once to learn its output dimension.
    pub async fn probe<E: Embedder>(embedder: &E) -> Result<Self, EmbedError> {
        let probe = embedder.embed("probe").await?;
        if probe.is_empty() {
            return Err(EmbedError::EmptyVector {
                model: embedder.model_id().to_string(),
            });
        }
        Ok(Self {
            model: embedder.model_id().to_string(),
            dimension: probe.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEmbedder;

    #[tokio::test]
    async fn probe_reports_model_and_dimension() {
        let e = MockEmbedder::new();
        let space = EmbeddingSpace::probe(&e).await.unwrap();
        assert_eq!(space.model, e.model_id());
        assert_eq!(space.dimension, crate::mock::MOCK_DIMENSION);
    }

    #[tokio::test]
    async fn dimension_is_constant_across_texts() {
        let e = MockEmbedder::new();
        let texts = ["", "fn main() {}", "a much longer piece of text about parsers and lexers"];
        let mut lens = Vec::new();
        for t in texts {
            lens.push(e.embed(t).await.unwrap().len());
        }
        assert!(lens.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn probe_fails_for_failing_embedder() {
        assert!(EmbeddingSpace::probe(&MockEmbedder::failing()).await.is_err());
    }
}
