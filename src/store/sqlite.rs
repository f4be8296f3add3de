//! SQLite-backed [`VectorStore`].
//!
//! One table (`chunk_vectors`) holds every collection; rows are keyed by
//! `(collection, id)` so re-indexing a chunk overwrites in place. Vectors
//! are stored as little-endian f32 BLOBs and scored in process.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{IndexedChunk, RetrievalResult, RetrievedChunk};

use super::{check_dims, cosine_distance, rank, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    async fn stored_dims(&self, excluding_id: Option<&str>) -> Result<Option<usize>> {
        let dims: Option<i64> = sqlx::query_scalar(
            "SELECT dims FROM chunk_vectors WHERE collection = ? AND id != ? LIMIT 1",
        )
        .bind(&self.collection)
        .bind(excluding_id.unwrap_or(""))
        .fetch_optional(&self.pool)
        .await?;
        Ok(dims.map(|d| d as usize))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, entry: &IndexedChunk) -> Result<()> {
        if let Some(dims) = self.stored_dims(Some(&entry.id)).await? {
            check_dims(dims, entry.embedding.len())?;
        }

        let now = chrono::Utc::now().timestamp();
        let blob = vec_to_blob(&entry.embedding);

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (collection, id, source_file, chunk_name, chunk_index,
                                       text, hash, dims, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                source_file = excluded.source_file,
                chunk_name = excluded.chunk_name,
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                hash = excluded.hash,
                dims = excluded.dims,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(&self.collection)
        .bind(&entry.id)
        .bind(&entry.source_file)
        .bind(&entry.chunk_name)
        .bind(entry.chunk_index as i64)
        .bind(&entry.text)
        .bind(&entry.hash)
        .bind(entry.embedding.len() as i64)
        .bind(&blob)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_file, chunk_name, text, dims, embedding
            FROM chunk_vectors
            WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let dims: i64 = row.get("dims");
            check_dims(dims as usize, embedding.len())?;

            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            hits.push(RetrievedChunk {
                id: row.get("id"),
                source_file: row.get("source_file"),
                chunk_name: row.get("chunk_name"),
                text: row.get("text"),
                distance: cosine_distance(embedding, &vector),
            });
        }

        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn content_hash(&self, id: &str) -> Result<Option<String>> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT hash FROM chunk_vectors WHERE collection = ? AND id = ?")
                .bind(&self.collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::migrate::migrate_pool;
    use tempfile::TempDir;

    async fn open(tmp: &TempDir, collection: &str) -> SqliteVectorStore {
        let mut config = Config::default();
        config.db.path = tmp.path().join("index.sqlite");
        let pool = crate::db::connect(&config).await.unwrap();
        migrate_pool(&pool).await.unwrap();
        SqliteVectorStore::new(pool, collection)
    }

    fn entry(id: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            source_file: "handbook".to_string(),
            chunk_name: "chunk_0".to_string(),
            chunk_index: 0,
            text: format!("body {}", id),
            hash: "h".to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_row() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "naac_chunks").await;
        store.upsert(&entry("handbook_chunk_0", vec![1.0, 0.0])).await.unwrap();
        store.upsert(&entry("handbook_chunk_0", vec![1.0, 0.0])).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_returns_fewer_than_k_when_small() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "naac_chunks").await;
        store.upsert(&entry("a", vec![1.0, 0.0])).await.unwrap();
        store.upsert(&entry("b", vec![0.0, 1.0])).await.unwrap();

        let hits = store.query(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let a = open(&tmp, "one").await;
        a.upsert(&entry("x", vec![1.0])).await.unwrap();
        let b = SqliteVectorStore::new(a.pool.clone(), "two");
        assert_eq!(b.count().await.unwrap(), 0);
        assert!(b.query(&[1.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_dimension_mismatch_fails() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "naac_chunks").await;
        store.upsert(&entry("a", vec![1.0, 0.0])).await.unwrap();
        let err = store.query(&[1.0, 0.0, 0.0], 1).await.unwrap_err();
        assert!(err.to_string().contains("dimensionality mismatch"));
    }
}
