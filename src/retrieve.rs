//! Top-k similarity retrieval.

use anyhow::Result;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::RetrievalResult;
use crate::store::VectorStore;

/// Embed `query` and return up to `k` nearest chunks, closest first.
///
/// An empty index yields an empty result. A query embedding whose
/// dimensionality differs from the index is an error.
pub async fn retrieve(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    query: &str,
    k: usize,
) -> Result<RetrievalResult> {
    if k == 0 {
        return Ok(Vec::new());
    }
    let query_vec = embed_query(embedder, query).await?;
    store.query(&query_vec, k).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::index_chunk;
    use crate::store::InMemoryVectorStore;
    use async_trait::async_trait;

    /// Maps a few keywords onto fixed axes.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.matches("library").count() as f32 + 0.01,
                        t.matches("placement").count() as f32 + 0.01,
                        t.matches("research").count() as f32 + 0.01,
                    ]
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let store = InMemoryVectorStore::new();
        index_chunk(&KeywordEmbedder, &store, "a", 0, "library hours").await.unwrap();
        index_chunk(&KeywordEmbedder, &store, "b", 0, "placement cell").await.unwrap();

        let hits = retrieve(&KeywordEmbedder, &store, "library", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_file, "a");
    }

    #[tokio::test]
    async fn test_results_non_decreasing_distance() {
        let store = InMemoryVectorStore::new();
        let docs = [
            "library library",
            "research grants",
            "placement drives",
            "library and research",
        ];
        for (i, d) in docs.iter().enumerate() {
            index_chunk(&KeywordEmbedder, &store, "doc", i, d).await.unwrap();
        }

        let hits = retrieve(&KeywordEmbedder, &store, "research", 4).await.unwrap();
        assert_eq!(hits.len(), 4);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(hits[0].chunk_name, "chunk_1");
    }

    #[tokio::test]
    async fn test_empty_index() {
        let store = InMemoryVectorStore::new();
        assert!(retrieve(&KeywordEmbedder, &store, "anything", 3)
            .await
            .unwrap()
            .is_empty());
    }
}
