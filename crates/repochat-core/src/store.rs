//! Namespaced vector store for chunk embeddings. Supports upsert and similarity search.
//!
//! Each namespace (one per repository) is a disjoint partition: a query only ever
//! scores points written under the namespace it names. Payloads are kept as loose
//! JSON, the way a hosted vector database returns them, and are validated into
//! [`ChunkMetadata`] on the way out.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chunks::Chunk;
use crate::embed::EmbeddingSpace;

const STORE_VERSION: u32 = 1;

/// Typed view of a stored payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_path: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Chunk text. Entries without it are skipped at retrieval time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A vector and its metadata, ready to be written.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Stable id within the namespace; writing the same id again replaces the point.
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl IndexEntry {
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: format!("{}#{}", chunk.source_path, chunk.chunk_index),
            vector,
            metadata: ChunkMetadata {
                source_path: chunk.source_path,
                chunk_index: chunk.chunk_index,
                total_chunks: chunk.total_chunks,
                text: Some(chunk.text),
            },
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    /// Cosine similarity, higher is closer.
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// What a namespace was built with and how big it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub space: EmbeddingSpace,
    pub entries: usize,
}

/// A store of `(vector, metadata)` points partitioned by namespace.
pub trait VectorIndex: Send + Sync {
    /// Drop every point in `namespace` and (re)create it for vectors from `space`.
    fn reset_namespace(
        &self,
        namespace: &str,
        space: EmbeddingSpace,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert or replace points in an existing namespace.
    fn upsert(
        &self,
        namespace: &str,
        entries: Vec<IndexEntry>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Up to `k` nearest points in `namespace`, most similar first.
    fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        k: usize,
    ) -> impl Future<Output = Result<Vec<ScoredMatch>, StoreError>> + Send;

    /// `None` when the namespace has never been created.
    fn namespace_info(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<Option<NamespaceInfo>, StoreError>> + Send;

    fn namespaces(
        &self,
    ) -> impl Future<Output = Result<Vec<(String, NamespaceInfo)>, StoreError>> + Send;

    /// Make every write so far durable. Writers call this once after a batch of
    /// resets and upserts, not after each one.
    fn flush(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    /// Unit length, so cosine similarity is a dot product.
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NamespaceData {
    space: EmbeddingSpace,
    points: BTreeMap<String, StoredPoint>,
}

#[derive(Deserialize)]
struct StoreFile {
    version: u32,
    namespaces: BTreeMap<String, NamespaceData>,
}

/// Borrowed form of [`StoreFile`] for writing without copying the vectors.
#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    namespaces: &'a BTreeMap<String, NamespaceData>,
}

/// Built-in [`VectorIndex`]: brute-force cosine search in memory, optionally
/// persisted to a JSON file on [`VectorIndex::flush`].
#[derive(Debug, Default)]
pub struct VectorStore {
    path: Option<PathBuf>,
    namespaces: RwLock<BTreeMap<String, NamespaceData>>,
    /// Set by every mutation, cleared when the file is written.
    dirty: AtomicBool,
}

impl VectorStore {
    /// Store that lives only as long as the process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by `path`. Loads existing contents; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let namespaces = match std::fs::read_to_string(&path) {
            Ok(s) => {
                let file: StoreFile =
                    serde_json::from_str(&s).map_err(|e| StoreError::Load(path.clone(), e))?;
                if file.version != STORE_VERSION {
                    return Err(StoreError::Version(file.version));
                }
                file.namespaces
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        tracing::debug!(path = %path.display(), namespaces = namespaces.len(), "opened vector store");
        Ok(Self {
            path: Some(path),
            namespaces: RwLock::new(namespaces),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Serializes the store if it changed since the last write. Clears the dirty flag
    /// while still holding the lock, so a concurrent mutation marks it again.
    fn snapshot(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.namespaces.read().map_err(|_| StoreError::Poisoned)?;
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(None);
        }
        let file = StoreFileRef {
            version: STORE_VERSION,
            namespaces: &*guard,
        };
        match serde_json::to_vec(&file) {
            Ok(json) => Ok(Some(json)),
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                Err(StoreError::Encode(e))
            }
        }
    }
}

impl VectorIndex for VectorStore {
    async fn reset_namespace(
        &self,
        namespace: &str,
        space: EmbeddingSpace,
    ) -> Result<(), StoreError> {
        let mut guard = self.namespaces.write().map_err(|_| StoreError::Poisoned)?;
        let previous = guard.insert(
            namespace.to_string(),
            NamespaceData {
                space,
                points: BTreeMap::new(),
            },
        );
        if let Some(previous) = previous {
            tracing::info!(namespace, removed = previous.points.len(), "namespace reset");
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    async fn upsert(&self, namespace: &str, entries: Vec<IndexEntry>) -> Result<(), StoreError> {
        let mut guard = self.namespaces.write().map_err(|_| StoreError::Poisoned)?;
        let data = guard
            .get_mut(namespace)
            .ok_or_else(|| StoreError::UnknownNamespace(namespace.to_string()))?;
        for entry in &entries {
            if entry.vector.len() != data.space.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: data.space.dimension,
                    got: entry.vector.len(),
                });
            }
        }
        for entry in entries {
            let value = serde_json::to_value(&entry.metadata).map_err(StoreError::Encode)?;
            let payload = match value {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            data.points.insert(
                entry.id,
                StoredPoint {
                    vector: normalize(&entry.vector),
                    payload,
                },
            );
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredMatch>, StoreError> {
        let guard = self.namespaces.read().map_err(|_| StoreError::Poisoned)?;
        let data = guard
            .get(namespace)
            .ok_or_else(|| StoreError::UnknownNamespace(namespace.to_string()))?;
        if vector.len() != data.space.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: data.space.dimension,
                got: vector.len(),
            });
        }
        if k == 0 || data.points.is_empty() {
            return Ok(Vec::new());
        }
        let q_norm = normalize(vector);
        let mut scored: Vec<(&String, f32, &StoredPoint)> = data
            .points
            .iter()
            .map(|(id, p)| (id, dot(&q_norm, &p.vector), p))
            .filter(|(id, score, _)| {
                if score.is_nan() {
                    tracing::warn!(namespace, id = %id, "skipping point with NaN similarity");
                }
                !score.is_nan()
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let hits = scored
            .into_iter()
            .filter_map(|(id, score, p)| match parse_payload(&p.payload) {
                Some(metadata) => Some(ScoredMatch { score, metadata }),
                None => {
                    tracing::warn!(namespace, id = %id, "dropping point with malformed metadata");
                    None
                }
            })
            .take(k)
            .collect();
        Ok(hits)
    }

    async fn namespace_info(&self, namespace: &str) -> Result<Option<NamespaceInfo>, StoreError> {
        let guard = self.namespaces.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.get(namespace).map(info))
    }

    async fn namespaces(&self) -> Result<Vec<(String, NamespaceInfo)>, StoreError> {
        let guard = self.namespaces.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.iter().map(|(name, d)| (name.clone(), info(d))).collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let Some(json) = self.snapshot()? else {
            return Ok(());
        };
        let bytes = json.len();
        let tmp = path.with_extension("json.tmp");
        let written = async {
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;
        if let Err(e) = written {
            self.dirty.store(true, Ordering::Release);
            return Err(StoreError::Io(e));
        }
        tracing::debug!(path = %path.display(), bytes, "vector store written");
        Ok(())
    }
}

fn info(data: &NamespaceData) -> NamespaceInfo {
    NamespaceInfo {
        space: data.space.clone(),
        entries: data.points.len(),
    }
}

fn parse_payload(payload: &Map<String, Value>) -> Option<ChunkMetadata> {
    serde_json::from_value(Value::Object(payload.clone())).ok()
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("namespace not found: {0}")]
    UnknownNamespace(String),
    #[error("vector has {got} dimensions, namespace expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("vector store lock poisoned")]
    Poisoned,
    #[error("failed to read index file {0}: {1}")]
    Load(PathBuf, serde_json::Error),
    #[error("unsupported index file version {0}")]
    Version(u32),
    #[error("failed to encode index: {0}")]
    Encode(serde_json::Error),
    #[error("index file I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(dimension: usize) -> EmbeddingSpace {
        EmbeddingSpace {
            model: "test".into(),
            dimension,
        }
    }

    fn entry(path: &str, index: usize, vector: Vec<f32>) -> IndexEntry {
        IndexEntry::from_chunk(
            Chunk {
                source_path: path.into(),
                chunk_index: index,
                total_chunks: index + 1,
                text: format!("text of {path}#{index}"),
            },
            vector,
        )
    }

    async fn store_with(namespace: &str, entries: Vec<IndexEntry>) -> VectorStore {
        let store = VectorStore::new();
        store.reset_namespace(namespace, space(2)).await.unwrap();
        store.upsert(namespace, entries).await.unwrap();
        store
    }

    #[tokio::test]
    async fn query_orders_by_similarity_and_caps_at_k() {
        let store = store_with(
            "ns",
            vec![
                entry("far.rs", 0, vec![0.0, 1.0]),
                entry("near.rs", 0, vec![1.0, 0.0]),
                entry("mid.rs", 0, vec![1.0, 1.0]),
            ],
        )
        .await;
        let hits = store.query("ns", &[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.source_path, "near.rs");
        assert_eq!(hits[1].metadata.source_path, "mid.rs");
        assert!(hits[0].score >= hits[1].score);

        let all = store.query("ns", &[0.3, 0.7], 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = store_with("a", vec![entry("a.rs", 0, vec![1.0, 0.0])]).await;
        store.reset_namespace("b", space(2)).await.unwrap();
        store
            .upsert("b", vec![entry("b.rs", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        let hits = store.query("a", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.source_path, "a.rs");
    }

    #[tokio::test]
    async fn unknown_namespace_is_an_error() {
        let store = VectorStore::new();
        assert!(matches!(
            store.query("missing", &[1.0], 3).await,
            Err(StoreError::UnknownNamespace(_))
        ));
        assert!(store.namespace_info("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_replaces_previous_points() {
        let store = store_with(
            "ns",
            vec![entry("old.rs", 0, vec![1.0, 0.0]), entry("old.rs", 1, vec![0.0, 1.0])],
        )
        .await;
        store.reset_namespace("ns", space(2)).await.unwrap();
        store
            .upsert("ns", vec![entry("new.rs", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        let info = store.namespace_info("ns").await.unwrap().unwrap();
        assert_eq!(info.entries, 1);
        let hits = store.query("ns", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits[0].metadata.source_path, "new.rs");
    }

    #[tokio::test]
    async fn same_id_is_overwritten_not_duplicated() {
        let store = store_with("ns", vec![entry("a.rs", 0, vec![1.0, 0.0])]).await;
        store
            .upsert("ns", vec![entry("a.rs", 0, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(store.namespace_info("ns").await.unwrap().unwrap().entries, 1);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let store = store_with("ns", vec![]).await;
        assert!(matches!(
            store.upsert("ns", vec![entry("a.rs", 0, vec![1.0, 0.0, 0.0])]).await,
            Err(StoreError::DimensionMismatch { expected: 2, got: 3 })
        ));
        assert!(matches!(
            store.query("ns", &[1.0], 1).await,
            Err(StoreError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped() {
        let store = store_with("ns", vec![entry("good.rs", 0, vec![0.0, 1.0])]).await;
        {
            let mut guard = store.namespaces.write().unwrap();
            let data = guard.get_mut("ns").unwrap();
            let mut payload = Map::new();
            payload.insert("text".into(), Value::String("orphan".into()));
            data.points.insert(
                "bad".into(),
                StoredPoint {
                    vector: vec![1.0, 0.0],
                    payload,
                },
            );
        }
        let hits = store.query("ns", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.source_path, "good.rs");
    }

    #[tokio::test]
    async fn persisted_store_reopens_with_same_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        {
            let store = VectorStore::open(&path).unwrap();
            store.reset_namespace("ns", space(2)).await.unwrap();
            store
                .upsert("ns", vec![entry("a.rs", 0, vec![3.0, 4.0])])
                .await
                .unwrap();
            store.flush().await.unwrap();
        }
        let store = VectorStore::open(&path).unwrap();
        let list = store.namespaces().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].0, "ns");
        assert_eq!(list[0].1.space, space(2));
        let hits = store.query("ns", &[3.0, 4.0], 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert_eq!(hits[0].metadata.text.as_deref(), Some("text of a.rs#0"));
    }

    #[tokio::test]
    async fn file_is_written_on_flush_only_and_only_when_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let store = VectorStore::open(&path).unwrap();
        store.reset_namespace("ns", space(2)).await.unwrap();
        for i in 0..5 {
            store
                .upsert("ns", vec![entry("a.rs", i, vec![1.0, i as f32])])
                .await
                .unwrap();
        }
        assert!(!path.exists());

        store.flush().await.unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("index.json.tmp").exists());

        std::fs::remove_file(&path).unwrap();
        store.flush().await.unwrap();
        assert!(!path.exists(), "clean store must not be rewritten");

        store
            .upsert("ns", vec![entry("b.rs", 0, vec![0.0, 1.0])])
            .await
            .unwrap();
        store.flush().await.unwrap();
        let reopened = VectorStore::open(&path).unwrap();
        assert_eq!(reopened.namespace_info("ns").await.unwrap().unwrap().entries, 6);
    }

    #[tokio::test]
    async fn flush_without_backing_file_is_a_no_op() {
        let store = store_with("ns", vec![entry("a.rs", 0, vec![1.0, 0.0])]).await;
        store.flush().await.unwrap();
        assert!(store.path().is_none());
    }

    #[tokio::test]
    async fn nan_vectors_are_skipped_without_disturbing_order() {
        let store = store_with(
            "ns",
            vec![
                entry("near.rs", 0, vec![1.0, 0.0]),
                entry("nan.rs", 0, vec![f32::NAN, 1.0]),
                entry("far.rs", 0, vec![0.0, 1.0]),
                entry("mid.rs", 0, vec![1.0, 1.0]),
            ],
        )
        .await;
        let hits = store.query("ns", &[1.0, 0.2], 10).await.unwrap();
        let paths: Vec<&str> = hits.iter().map(|h| h.metadata.source_path.as_str()).collect();
        assert_eq!(paths, ["near.rs", "mid.rs", "far.rs"]);
    }

    #[test]
    fn open_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path().join("none.json")).unwrap();
        assert!(store.namespaces.read().unwrap().is_empty());
    }

    #[test]
    fn open_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(VectorStore::open(&path), Err(StoreError::Load(..))));
    }
}
