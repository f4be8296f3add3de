//! Similarity index abstraction.
//!
//! The [`VectorStore`] trait is the only way the pipeline touches stored
//! embeddings, so indexing and retrieval can run against SQLite in
//! production and an in-memory map in tests.
//!
//! Both backends share the same contract:
//!
//! | Method | Behavior |
//! |--------|----------|
//! | [`upsert`](VectorStore::upsert) | Insert, or overwrite an entry with the same id |
//! | [`query`](VectorStore::query) | Up to `k` entries by increasing cosine distance |
//! | [`count`](VectorStore::count) | Number of entries in the collection |
//! | [`content_hash`](VectorStore::content_hash) | Stored text hash for an id, if any |
//!
//! A collection has one dimensionality. Writing or querying with a vector
//! of a different length is a configuration error, not a recoverable one.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::{RetrievalResult, RetrievedChunk};

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, entry: &crate::models::IndexedChunk) -> Result<()>;

    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult>;

    async fn count(&self) -> Result<usize>;

    async fn content_hash(&self, id: &str) -> Result<Option<String>>;
}

/// Cosine distance: `0.0` for identical direction, `2.0` for opposite.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

pub(crate) fn check_dims(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        bail!(
            "Embedding dimensionality mismatch: index holds {}-dim vectors, got {}. \
             Indexing and querying must use the same embedding model.",
            expected,
            got
        );
    }
    Ok(())
}

/// Sort hits by increasing distance (id breaks ties) and keep the first `k`.
pub(crate) fn rank(mut hits: Vec<RetrievedChunk>, k: usize) -> RetrievalResult {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}
