// src/services/vector_store.rs
//! Persistent similarity-search collection of embedded document chunks.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::message::{Meta, SourceDocument};

const COLLECTION_FILE: &str = "collection.json";

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("vector store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub metadata: Meta,
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, chunks: Vec<StoredChunk>) -> Result<(), VectorStoreError>;

    /// Top `k` chunks by cosine similarity, best first.
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SourceDocument>, VectorStoreError>;

    /// Drop every chunk of a document. Returns the number removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize, VectorStoreError>;

    async fn count(&self) -> usize;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    chunks: Vec<StoredChunk>,
}

/// Collection kept in memory and written through to a JSON file.
#[derive(Clone)]
pub struct LocalVectorStore {
    path: PathBuf,
    inner: Arc<RwLock<Collection>>,
}

impl LocalVectorStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, VectorStoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(COLLECTION_FILE);

        let collection = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Collection>(&bytes) {
                Ok(c) => {
                    tracing::info!(path = %path.display(), chunks = c.chunks.len(), "loaded vector store");
                    c
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "vector store unreadable, starting empty");
                    Collection::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "creating new vector store");
                Collection::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, inner: Arc::new(RwLock::new(collection)) })
    }

    async fn persist(&self, collection: &Collection) -> Result<(), VectorStoreError> {
        let bytes = serde_json::to_vec(collection)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn add(&self, chunks: Vec<StoredChunk>) -> Result<(), VectorStoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut guard = self.inner.write().await;
        let expected = guard
            .chunks
            .first()
            .map(|c| c.embedding.len())
            .unwrap_or(chunks[0].embedding.len());
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != expected) {
            return Err(VectorStoreError::DimensionMismatch {
                expected,
                actual: bad.embedding.len(),
            });
        }

        let added = chunks.len();
        guard.chunks.extend(chunks);
        if let Err(e) = self.persist(&guard).await {
            let keep = guard.chunks.len() - added;
            guard.chunks.truncate(keep);
            return Err(e);
        }
        tracing::debug!(added, total = guard.chunks.len(), "chunks added to vector store");
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SourceDocument>, VectorStoreError> {
        let guard = self.inner.read().await;
        if let Some(first) = guard.chunks.first() {
            if first.embedding.len() != query.len() {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: first.embedding.len(),
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<(usize, f32)> = guard
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, &c.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let chunk = &guard.chunks[i];
                SourceDocument {
                    content: chunk.content.clone(),
                    metadata: chunk.metadata.clone(),
                    score,
                }
            })
            .collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, VectorStoreError> {
        let mut guard = self.inner.write().await;
        let before = guard.chunks.len();
        guard.chunks.retain(|c| c.document_id != document_id);
        let removed = before - guard.chunks.len();
        if removed > 0 {
            self.persist(&guard).await?;
        }
        Ok(removed)
    }

    async fn count(&self) -> usize {
        self.inner.read().await.chunks.len()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, doc: &str, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            id: id.to_string(),
            document_id: doc.to_string(),
            content: format!("content {id}"),
            metadata: Meta::new(),
            embedding,
        }
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        store
            .add(vec![
                chunk("a", "doc1", vec![1.0, 0.0]),
                chunk("b", "doc1", vec![0.7, 0.7]),
                chunk("c", "doc2", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.similarity_search(&[0.0, 1.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "content c");
        assert_eq!(hits[1].content, "content b");

        let reopened = LocalVectorStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count().await, 3);
        assert_eq!(reopened.delete_document("doc1").await.unwrap(), 2);
        assert_eq!(reopened.count().await, 1);
    }

    #[tokio::test]
    async fn rejects_mismatched_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        store.add(vec![chunk("a", "d", vec![1.0, 0.0])]).await.unwrap();
        let err = store.add(vec![chunk("b", "d", vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { expected: 2, actual: 1 }));
        assert_eq!(store.count().await, 1);
    }
}
