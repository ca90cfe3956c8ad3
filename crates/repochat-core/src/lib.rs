//! All backend logic independent of how the app is run.
//!
//! A repository is fetched, its source files are chunked and embedded, and the
//! vectors are stored under one namespace per repository. Questions are answered
//! from the nearest chunks of the active namespace. repochat keeps its config,
//! index and clones in its own app data directory (see [app_data]).

pub mod app_data;
pub mod chunks;
pub mod config;
pub mod embed;
pub mod error;
pub mod files;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod openai;
pub mod query;
pub mod repo;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod mock;

pub use app_data::{app_data_dir, index_path, repos_dir};
pub use chunks::{chunk_file, chunk_files, split_chars, Chunk, DEFAULT_MAX_CHARS};
pub use config::{load_config, save_config, CompletionBackend, Config, ConfigError, Settings};
pub use embed::{BoxError, EmbedError, Embedder, EmbeddingSpace};
pub use error::RagError;
pub use files::{scan_repository, FileRecord, ScanError, ScanReport, SkipReason, SkippedFile};
pub use index::{ingest, IngestOptions, IngestReport};
pub use llm::{AnyCompleter, Completer, CompletionError, Message, Role};
pub use ollama::{OllamaClient, OllamaError};
pub use openai::{OpenAiClient, OpenAiError};
pub use query::{answer, Answer, QueryOptions, Source};
pub use repo::{GitSource, RepoError, RepoLocation, RepositorySource};
pub use session::{ConversationState, Session, SessionState};
pub use store::{ChunkMetadata, IndexEntry, NamespaceInfo, ScoredMatch, StoreError, VectorIndex, VectorStore};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "repochat-core ready"
}
