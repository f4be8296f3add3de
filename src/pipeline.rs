//! Process-wide pipeline context.
//!
//! The embedding model, similarity index, and generation client are built
//! once at startup and handed to every component that needs them. Nothing
//! here is torn down explicitly; the index is append/upsert-only and the
//! clients are read-mostly.

use anyhow::Result;

use crate::config::Config;
use crate::context::pack;
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::generate::{create_generator, generate, DisabledGenerator, TextGenerator};
use crate::migrate::migrate_pool;
use crate::models::RetrievalResult;
use crate::retrieve::retrieve;
use crate::store::{SqliteVectorStore, VectorStore};

pub struct Pipeline {
    pub config: Config,
    pub embedder: Box<dyn EmbeddingProvider>,
    pub store: Box<dyn VectorStore>,
    pub generator: Box<dyn TextGenerator>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        embedder: Box<dyn EmbeddingProvider>,
        store: Box<dyn VectorStore>,
        generator: Box<dyn TextGenerator>,
    ) -> Self {
        Self {
            config,
            embedder,
            store,
            generator,
        }
    }

    /// Open the SQLite index and embedding provider from config.
    ///
    /// The generation client is only contacted when `with_generator` is set,
    /// so indexing and search work without an LLM credential.
    pub async fn open(config: &Config, with_generator: bool) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate_pool(&pool).await?;
        let store = SqliteVectorStore::new(pool, config.db.collection.clone());
        let embedder = create_provider(&config.embedding)?;

        let generator: Box<dyn TextGenerator> = if with_generator {
            create_generator(&config.generation).await?
        } else {
            Box::new(DisabledGenerator)
        };

        Ok(Self::new(config.clone(), embedder, Box::new(store), generator))
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        retrieve(self.embedder.as_ref(), self.store.as_ref(), query, k).await
    }

    /// Retrieve, pack, and generate for one query.
    pub async fn answer(&self, query: &str, k: usize) -> Result<String> {
        let results = self.retrieve(query, k).await?;
        let context = pack(&results, self.config.retrieval.max_context_chars);
        generate(self.generator.as_ref(), query, &context).await
    }
}
