//! Offline index build: extract → chunk → embed/index.
//!
//! `ssr ingest` runs all three stages in order; each stage is also
//! available on its own (`extract`, `chunk`, `index`). Indexing skips
//! chunks whose stored content hash matches unless `--force` is given.

use anyhow::{bail, Result};

use crate::chunk::run_chunk;
use crate::config::Config;
use crate::extract::run_extract;
use crate::index::index_chunks_dir;
use crate::pipeline::Pipeline;
use crate::progress::ProgressReporter;

/// Embed every persisted chunk into the similarity index.
pub async fn run_index(config: &Config, force: bool, progress: &dyn ProgressReporter) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    if !config.paths.chunks_dir.exists() {
        bail!(
            "Chunks directory not found: {}. Run `ssr chunk` first.",
            config.paths.chunks_dir.display()
        );
    }

    let pipeline = Pipeline::open(config, false).await?;
    let stats = index_chunks_dir(
        pipeline.embedder.as_ref(),
        pipeline.store.as_ref(),
        &config.paths.chunks_dir,
        config.embedding.batch_size,
        force,
        progress,
    )
    .await?;
    let total = pipeline.store.count().await?;

    println!("index");
    println!("  embedded: {}", stats.embedded);
    println!("  unchanged: {}", stats.unchanged);
    println!("  total entries: {}", total);
    Ok(())
}

/// Run the full offline build.
pub async fn run_ingest(config: &Config, force: bool, progress: &dyn ProgressReporter) -> Result<()> {
    run_extract(config, progress)?;
    run_chunk(config, progress)?;
    run_index(config, force, progress).await
}
