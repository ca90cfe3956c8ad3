//! Retrieval-augmented answering: embed the question, fetch the nearest chunks of one
//! namespace, wrap them in a context block and ask the completion service.

use crate::config::DEFAULT_TOP_K;
use crate::embed::{Embedder, EmbeddingSpace};
use crate::error::RagError;
use crate::llm::{Completer, Message};
use crate::store::{ScoredMatch, VectorIndex};

/// Placed between retrieved chunks inside the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n-------\n\n";

pub const SYSTEM_PROMPT: &str = "You are a senior software engineer helping a developer understand a codebase. \
Answer questions about the given codebase using only the code supplied in the context plus general reasoning. \
Always consider all of the context provided when forming a response. \
If the context does not contain the answer, say so.";

#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Nearest chunks to retrieve.
    pub top_k: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K }
    }
}

/// A chunk that went into the context, without its text.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub source_path: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Retrieved chunks, nearest first.
    pub sources: Vec<Source>,
}

/// Answers `question` from the code indexed under `namespace`.
pub async fn answer<E, I, C>(
    question: &str,
    namespace: &str,
    embedder: &E,
    index: &I,
    completer: &C,
    options: &QueryOptions,
) -> Result<Answer, RagError>
where
    E: Embedder,
    I: VectorIndex,
    C: Completer,
{
    let retrieval_err = |source| RagError::RetrievalFailed {
        namespace: namespace.to_string(),
        source,
    };
    let info = index
        .namespace_info(namespace)
        .await
        .map_err(retrieval_err)?
        .ok_or_else(|| RagError::NamespaceNotInitialized(namespace.to_string()))?;

    let query_vector = embedder
        .embed(question)
        .await
        .map_err(|source| RagError::EmbeddingFailed {
            context: "embedding the question".into(),
            source,
        })?;
    let current = EmbeddingSpace {
        model: embedder.model_id().to_string(),
        dimension: query_vector.len(),
    };
    if current != info.space {
        return Err(RagError::EmbeddingSpaceMismatch {
            namespace: namespace.to_string(),
            indexed: info.space,
            current,
        });
    }

    let matches = index
        .query(namespace, &query_vector, options.top_k)
        .await
        .map_err(retrieval_err)?;
    tracing::debug!(namespace, k = options.top_k, hits = matches.len(), "retrieved context");

    let (context, sources) = assemble_context(matches);
    let messages = build_messages(&context, question);
    let text = completer
        .complete(&messages)
        .await
        .map_err(RagError::CompletionFailed)?;
    Ok(Answer { text, sources })
}

/// Joins the texts of `matches` in the order given. Matches without text are skipped.
pub fn assemble_context(matches: Vec<ScoredMatch>) -> (String, Vec<Source>) {
    let mut texts = Vec::new();
    let mut sources = Vec::new();
    for m in matches {
        let Some(text) = m.metadata.text else {
            continue;
        };
        texts.push(text);
        sources.push(Source {
            source_path: m.metadata.source_path,
            chunk_index: m.metadata.chunk_index,
            total_chunks: m.metadata.total_chunks,
            score: m.score,
        });
    }
    (texts.join(CONTEXT_SEPARATOR), sources)
}

/// System instruction plus one user turn holding the delimited context and the question.
pub fn build_messages(context: &str, question: &str) -> Vec<Message> {
    let user = format!("<CONTEXT>\n{context}\n-------\n</CONTEXT>\n\n\nMY QUESTION:\n{question}");
    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}
