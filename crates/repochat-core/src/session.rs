//! One user session: which repository is active and the running conversation.
//!
//! States: `Uninitialized` → `Initializing` → `Ready`. Questions are only answered in
//! `Ready`, always against the namespace active when the question was asked.

use crate::config::Settings;
use crate::embed::Embedder;
use crate::error::RagError;
use crate::index::{ingest, IngestOptions, IngestReport};
use crate::llm::{Completer, Message};
use crate::query::{answer, Answer, QueryOptions};
use crate::repo::{RepoLocation, RepositorySource};
use crate::store::VectorIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing { namespace: String },
    Ready { namespace: String },
}

/// Transcript and active namespace. Lives only as long as the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub active_namespace: Option<String>,
}

pub struct Session<S, E, I, C> {
    settings: Settings,
    source: S,
    embedder: E,
    index: I,
    completer: C,
    ingest_options: IngestOptions,
    query_options: QueryOptions,
    state: SessionState,
    conversation: ConversationState,
}

impl<S, E, I, C> Session<S, E, I, C>
where
    S: RepositorySource,
    E: Embedder,
    I: VectorIndex,
    C: Completer,
{
    /// New session in `Uninitialized`. Chunk size and top-K come from `settings`.
    pub fn new(settings: Settings, source: S, embedder: E, index: I, completer: C) -> Self {
        let ingest_options = IngestOptions {
            max_chars: settings.config.max_chunk_chars,
            ..IngestOptions::default()
        };
        let query_options = QueryOptions {
            top_k: settings.config.top_k,
        };
        Self {
            settings,
            source,
            embedder,
            index,
            completer,
            ingest_options,
            query_options,
            state: SessionState::Uninitialized,
            conversation: ConversationState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    /// Ends the session, handing back its transcript.
    pub fn into_conversation(self) -> ConversationState {
        self.conversation
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Ingests `location` and makes it the active namespace.
    ///
    /// On failure the session returns to where it was: `Uninitialized`, or `Ready`
    /// on the previously active namespace.
    pub async fn initialize(&mut self, location: &str) -> Result<IngestReport, RagError> {
        self.settings.require_credentials()?;
        let location = parse_location(location)?;
        let namespace = location.namespace();
        let previous = std::mem::replace(
            &mut self.state,
            SessionState::Initializing {
                namespace: namespace.clone(),
            },
        );

        let result = ingest(
            &location,
            &self.source,
            &self.embedder,
            &self.index,
            &self.ingest_options,
        )
        .await;

        match result {
            Ok(report) => {
                self.activate_namespace(namespace);
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "initialization failed");
                self.state = match previous {
                    SessionState::Ready { namespace } => SessionState::Ready { namespace },
                    _ => SessionState::Uninitialized,
                };
                Err(e)
            }
        }
    }

    /// Makes an already ingested repository active without re-ingesting it.
    pub async fn resume(&mut self, location: &str) -> Result<(), RagError> {
        self.settings.require_credentials()?;
        let namespace = parse_location(location)?.namespace();
        let info = self
            .index
            .namespace_info(&namespace)
            .await
            .map_err(|source| RagError::RetrievalFailed {
                namespace: namespace.clone(),
                source,
            })?;
        if info.is_none() {
            return Err(RagError::NamespaceNotInitialized(namespace));
        }
        self.activate_namespace(namespace);
        Ok(())
    }

    /// Records the question, answers it from the active namespace and records the reply.
    /// A failed answer leaves the question in the transcript without a reply.
    pub async fn ask(&mut self, question: &str) -> Result<Answer, RagError> {
        let SessionState::Ready { namespace } = &self.state else {
            return Err(RagError::NotReady);
        };
        let namespace = namespace.clone();
        self.conversation.messages.push(Message::user(question));

        let reply = answer(
            question,
            &namespace,
            &self.embedder,
            &self.index,
            &self.completer,
            &self.query_options,
        )
        .await?;
        self.conversation
            .messages
            .push(Message::assistant(reply.text.clone()));
        Ok(reply)
    }

    fn activate_namespace(&mut self, namespace: String) {
        tracing::info!(namespace = %namespace, "namespace active");
        self.conversation.active_namespace = Some(namespace.clone());
        self.state = SessionState::Ready { namespace };
    }
}

fn parse_location(location: &str) -> Result<RepoLocation, RagError> {
    RepoLocation::parse(location).map_err(|source| RagError::RepositoryUnavailable {
        location: location.trim().to_string(),
        source,
    })
}
