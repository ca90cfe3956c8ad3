//! Ingestion pipeline: fetch → scan → chunk → embed → store, under one namespace per repository.
//!
//! Everything is embedded before the index is touched. Only then is the namespace
//! reset and rewritten, so an embedding failure leaves a previous index intact.

use std::time::Instant;

use crate::chunks::{chunk_file, DEFAULT_MAX_CHARS};
use crate::embed::{EmbedError, Embedder, EmbeddingSpace};
use crate::error::RagError;
use crate::files::scan_repository;
use crate::repo::{RepoLocation, RepositorySource};
use crate::store::{IndexEntry, VectorIndex};

/// Entries per index write.
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub max_chars: usize,
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Summary of an ingestion run.
#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    pub namespace: String,
    /// Supported files found (read or not).
    pub files_scanned: usize,
    /// Files that produced at least one chunk.
    pub files_indexed: usize,
    /// Supported files that could not be read as text.
    pub files_skipped: usize,
    pub chunks_written: usize,
    pub duration_ms: u64,
}

/// Runs the full pipeline for `location` and replaces its namespace in `index`.
pub async fn ingest<S, E, I>(
    location: &RepoLocation,
    source: &S,
    embedder: &E,
    index: &I,
    options: &IngestOptions,
) -> Result<IngestReport, RagError>
where
    S: RepositorySource,
    E: Embedder,
    I: VectorIndex,
{
    let start = Instant::now();
    let namespace = location.namespace();
    let unavailable = |source| RagError::RepositoryUnavailable {
        location: namespace.clone(),
        source,
    };

    let root = source.fetch(location).await.map_err(unavailable)?;
    let scan = scan_repository(&root).map_err(|e| unavailable(e.into()))?;
    tracing::info!(
        namespace = %namespace,
        files = scan.files.len(),
        skipped = scan.skipped.len(),
        "ingestion started"
    );

    let space = EmbeddingSpace::probe(embedder)
        .await
        .map_err(|source| RagError::EmbeddingFailed {
            context: format!("probing embedding model {}", embedder.model_id()),
            source,
        })?;

    let mut report = IngestReport {
        namespace: namespace.clone(),
        files_scanned: scan.files.len() + scan.skipped.len(),
        files_skipped: scan.skipped.len(),
        ..IngestReport::default()
    };
    let mut entries = Vec::new();
    for file in &scan.files {
        let chunks = chunk_file(file, options.max_chars);
        if chunks.is_empty() {
            continue;
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embed_err = |source| RagError::EmbeddingFailed {
            context: format!("embedding chunks of {}", file.relative_path),
            source,
        };
        let vectors = embedder.embed_batch(&texts).await.map_err(embed_err)?;
        if vectors.len() != chunks.len() || vectors.iter().any(|v| v.len() != space.dimension) {
            return Err(embed_err(EmbedError::Shape {
                expected: chunks.len(),
                dimension: space.dimension,
            }));
        }
        tracing::debug!(file = %file.relative_path, chunks = chunks.len(), "embedded");
        report.files_indexed += 1;
        entries.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector)),
        );
    }

    let write_err = |source| RagError::IndexWriteFailed {
        namespace: namespace.clone(),
        source,
    };
    index
        .reset_namespace(&namespace, space)
        .await
        .map_err(write_err)?;
    let batch_size = options.batch_size.max(1);
    let total = entries.len();
    let mut pending = entries.into_iter().peekable();
    while pending.peek().is_some() {
        let batch: Vec<IndexEntry> = pending.by_ref().take(batch_size).collect();
        let written = batch.len();
        index.upsert(&namespace, batch).await.map_err(write_err)?;
        report.chunks_written += written;
        tracing::debug!(
            namespace = %namespace,
            progress = format_args!("{}/{total}", report.chunks_written),
            "batch written"
        );
    }
    index.flush().await.map_err(write_err)?;

    report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
    tracing::info!(
        namespace = %namespace,
        files = report.files_indexed,
        chunks = report.chunks_written,
        duration_ms = report.duration_ms,
        "ingestion finished"
    );
    Ok(report)
}
