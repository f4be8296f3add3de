//! Embedding indexer: chunk files → similarity index.
//!
//! Each chunk is embedded and upserted under a deterministic id
//! (`<document>_chunk_<index>`), so re-running the indexer overwrites
//! entries instead of duplicating them. Chunks whose stored content hash
//! matches the file on disk are skipped unless `force` is set.

use anyhow::{Context, Result};
use std::path::Path;

use crate::chunk::load_chunks;
use crate::embedding::{embed_checked, EmbeddingProvider};
use crate::models::{Chunk, IndexedChunk};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store::VectorStore;

/// Globally unique index id for a chunk.
pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    format!("{}_chunk_{}", document_id, chunk_index)
}

/// Human-facing chunk name stored in metadata and cited in prompts.
pub fn chunk_name(chunk_index: usize) -> String {
    format!("chunk_{}", chunk_index)
}

fn to_indexed(chunk: &Chunk, embedding: Vec<f32>) -> IndexedChunk {
    IndexedChunk {
        id: chunk_id(&chunk.document_id, chunk.chunk_index),
        source_file: chunk.document_id.clone(),
        chunk_name: chunk_name(chunk.chunk_index),
        chunk_index: chunk.chunk_index,
        text: chunk.text.clone(),
        hash: chunk.hash.clone(),
        embedding,
    }
}

/// Embed and upsert a single chunk.
pub async fn index_chunk(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    document_id: &str,
    chunk_index: usize,
    text: &str,
) -> Result<()> {
    let chunk = crate::chunk::make_chunk(document_id, chunk_index, text.to_string());
    let mut vectors = embed_checked(embedder, &[chunk.text.clone()]).await?;
    let embedding = vectors
        .pop()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;
    store.upsert(&to_indexed(&chunk, embedding)).await
}

/// Counts from indexing one or more documents.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub embedded: u64,
    pub unchanged: u64,
}

/// Index a document's chunks in batches of `batch_size`.
pub async fn index_chunks(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    chunks: &[Chunk],
    batch_size: usize,
    force: bool,
) -> Result<IndexStats> {
    let mut stats = IndexStats::default();

    let mut pending: Vec<&Chunk> = Vec::new();
    for chunk in chunks {
        let id = chunk_id(&chunk.document_id, chunk.chunk_index);
        if !force && store.content_hash(&id).await?.as_deref() == Some(chunk.hash.as_str()) {
            stats.unchanged += 1;
            continue;
        }
        pending.push(chunk);
    }

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_checked(embedder, &texts).await?;
        for (chunk, vector) in batch.iter().zip(vectors) {
            store.upsert(&to_indexed(chunk, vector)).await?;
            stats.embedded += 1;
        }
    }

    Ok(stats)
}

/// Index every document directory under `chunks_dir`.
pub async fn index_chunks_dir(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    chunks_dir: &Path,
    batch_size: usize,
    force: bool,
    progress: &dyn ProgressReporter,
) -> Result<IndexStats> {
    let mut total = IndexStats::default();

    for entry in walkdir::WalkDir::new(chunks_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry
            .with_context(|| format!("Failed to read chunks dir: {}", chunks_dir.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let document_id = entry.file_name().to_string_lossy().to_string();
        let chunks = load_chunks(chunks_dir, &document_id)?;

        let stats = index_chunks(embedder, store, &chunks, batch_size, force).await?;
        progress.report(ProgressEvent::Indexed {
            document: document_id,
            embedded: stats.embedded,
            unchanged: stats.unchanged,
        });

        total.embedded += stats.embedded;
        total.unchanged += stats.unchanged;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::build_chunks;
    use crate::store::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn embedder() -> CountingEmbedder {
        CountingEmbedder {
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_ids_are_deterministic() {
        assert_eq!(chunk_id("prospectus", 4), "prospectus_chunk_4");
        assert_eq!(chunk_name(4), "chunk_4");
    }

    #[tokio::test]
    async fn test_index_same_chunk_twice_one_entry() {
        let e = embedder();
        let store = InMemoryVectorStore::new();
        index_chunk(&e, &store, "doc", 0, "hello world").await.unwrap();
        index_chunk(&e, &store, "doc", 0, "hello world").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_chunks_skipped() {
        let e = embedder();
        let store = InMemoryVectorStore::new();
        let chunks = build_chunks("doc", "a b c d e f g", 2);

        let first = index_chunks(&e, &store, &chunks, 3, false).await.unwrap();
        assert_eq!(first, IndexStats { embedded: 4, unchanged: 0 });

        let second = index_chunks(&e, &store, &chunks, 3, false).await.unwrap();
        assert_eq!(second, IndexStats { embedded: 0, unchanged: 4 });
        assert_eq!(e.calls.load(Ordering::SeqCst), 4);

        let forced = index_chunks(&e, &store, &chunks, 3, true).await.unwrap();
        assert_eq!(forced.embedded, 4);
        assert_eq!(store.count().await.unwrap(), 4);
    }

    struct WideEmbedder;

    #[async_trait]
    impl EmbeddingProvider for WideEmbedder {
        fn model_name(&self) -> &str {
            "wide"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_force_with_different_dims_fails() {
        let store = InMemoryVectorStore::new();
        let chunks = build_chunks("doc", "a b c d", 2);
        index_chunks(&embedder(), &store, &chunks, 8, false)
            .await
            .unwrap();

        let err = index_chunks(&WideEmbedder, &store, &chunks, 8, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimensionality mismatch"));
    }

    #[tokio::test]
    async fn test_metadata_recorded() {
        let e = embedder();
        let store = InMemoryVectorStore::new();
        let chunks = build_chunks("annual_report", "one two three", 2);
        index_chunks(&e, &store, &chunks, 8, false).await.unwrap();

        let hits = store.query(&[2.0, 1.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.source_file == "annual_report"));
        assert!(hits.iter().any(|h| h.chunk_name == "chunk_1" && h.text == "three"));
    }
}
