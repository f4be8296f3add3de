//! In-memory [`VectorStore`] for tests and dry runs.
//!
//! Entries live in a `BTreeMap` behind `std::sync::RwLock`. Queries are
//! brute-force cosine distance over every stored vector.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{IndexedChunk, RetrievalResult, RetrievedChunk};

use super::{check_dims, cosine_distance, rank, VectorStore};

pub struct InMemoryVectorStore {
    entries: RwLock<BTreeMap<String, IndexedChunk>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, entry: &IndexedChunk) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        if let Some(existing) = entries.values().find(|e| e.id != entry.id) {
            check_dims(existing.embedding.len(), entry.embedding.len())?;
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        let entries = self.entries.read().map_err(poisoned)?;
        if let Some(first) = entries.values().next() {
            check_dims(first.embedding.len(), embedding.len())?;
        }
        let hits: Vec<RetrievedChunk> = entries
            .values()
            .map(|e| RetrievedChunk {
                id: e.id.clone(),
                source_file: e.source_file.clone(),
                chunk_name: e.chunk_name.clone(),
                text: e.text.clone(),
                distance: cosine_distance(embedding, &e.embedding),
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(poisoned)?.len())
    }

    async fn content_hash(&self, id: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .map_err(poisoned)?
            .get(id)
            .map(|e| e.hash.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            source_file: "doc".to_string(),
            chunk_name: id.to_string(),
            chunk_index: 0,
            text: format!("text of {}", id),
            hash: format!("hash-{}", id),
            embedding,
        }
    }

    #[tokio::test]
    async fn upsert_same_id_overwrites() {
        let store = InMemoryVectorStore::new();
        store.upsert(&entry("a", vec![1.0, 0.0])).await.unwrap();
        let mut updated = entry("a", vec![0.0, 1.0]);
        updated.hash = "new".to_string();
        store.upsert(&updated).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.content_hash("a").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn query_orders_by_distance() {
        let store = InMemoryVectorStore::new();
        store.upsert(&entry("far", vec![-1.0, 0.0])).await.unwrap();
        store.upsert(&entry("near", vec![1.0, 0.1])).await.unwrap();
        store.upsert(&entry("mid", vec![0.0, 1.0])).await.unwrap();

        let hits = store.query(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn query_empty_store_is_empty() {
        let store = InMemoryVectorStore::new();
        assert!(store.query(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_wrong_dims_fails() {
        let store = InMemoryVectorStore::new();
        store.upsert(&entry("a", vec![1.0, 0.0])).await.unwrap();
        assert!(store.query(&[1.0, 0.0, 0.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn upsert_wrong_dims_fails() {
        let store = InMemoryVectorStore::new();
        store.upsert(&entry("a", vec![1.0, 0.0])).await.unwrap();
        assert!(store.upsert(&entry("b", vec![1.0])).await.is_err());
    }
}
