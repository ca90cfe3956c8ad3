//! Errors surfaced by the ingestion pipeline, the query engine and the session.
//!
//! Every external failure is wrapped with the file, namespace or operation it
//! happened in. [`RagError::user_message`] renders one legible line for the UI.

use crate::config::ConfigError;
use crate::embed::{EmbedError, EmbeddingSpace};
use crate::llm::CompletionError;
use crate::repo::RepoError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("repository unavailable: {location}")]
    RepositoryUnavailable {
        location: String,
        #[source]
        source: RepoError,
    },

    #[error("embedding failed ({context})")]
    EmbeddingFailed {
        context: String,
        #[source]
        source: EmbedError,
    },

    #[error("writing to index failed for namespace {namespace}")]
    IndexWriteFailed {
        namespace: String,
        #[source]
        source: StoreError,
    },

    #[error("retrieval failed for namespace {namespace}")]
    RetrievalFailed {
        namespace: String,
        #[source]
        source: StoreError,
    },

    #[error("completion failed")]
    CompletionFailed(#[source] CompletionError),

    #[error("namespace not initialized: {0}")]
    NamespaceNotInitialized(String),

    #[error("namespace {namespace} was indexed with {indexed:?}, queries use {current:?}")]
    EmbeddingSpaceMismatch {
        namespace: String,
        indexed: EmbeddingSpace,
        current: EmbeddingSpace,
    },

    #[error("no repository is ready; initialize one first")]
    NotReady,
}

impl RagError {
    /// One line suitable for showing to the user, including the underlying cause.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(e) => format!("Configuration problem: {e}"),
            Self::RepositoryUnavailable { location, source } => {
                format!("Could not get repository {location}: {source}")
            }
            Self::EmbeddingFailed { context, source } => {
                format!("The embedding service failed while {context}: {source}")
            }
            Self::IndexWriteFailed { namespace, source } => {
                format!("Could not write the index for {namespace}: {source}")
            }
            Self::RetrievalFailed { namespace, source } => {
                format!("Could not search the index for {namespace}: {source}")
            }
            Self::CompletionFailed(source) => {
                format!("The language model did not answer: {source}")
            }
            Self::NamespaceNotInitialized(namespace) => {
                format!("{namespace} has not been ingested yet. Initialize it first.")
            }
            Self::EmbeddingSpaceMismatch {
                namespace,
                indexed,
                current,
            } => format!(
                "{namespace} was indexed with {} ({} dims) but the current embedder is {} ({} dims). Re-ingest it.",
                indexed.model, indexed.dimension, current.model, current.dimension
            ),
            Self::NotReady => "Not ready: initialize a repository before asking questions.".into(),
        }
    }
}
