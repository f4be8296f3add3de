//! Interactive query commands: `ssr search` and `ssr ask`.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::models::RetrievedChunk;
use crate::pipeline::Pipeline;
use crate::progress::{ProgressEvent, ProgressReporter};

const PREVIEW_CHARS: usize = 300;

/// First `max` characters of `text` on a single line.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// `--k` override or `[retrieval].top_k`; must be at least 1.
pub fn resolve_k(k: Option<usize>, config: &Config) -> Result<usize> {
    match k.unwrap_or(config.retrieval.top_k) {
        0 => bail!("k must be >= 1"),
        k => Ok(k),
    }
}

fn print_hits(hits: &[RetrievedChunk]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            hit.distance,
            hit.source_file,
            hit.chunk_name
        );
        println!("    excerpt: \"{}\"", preview(&hit.text, PREVIEW_CHARS));
        println!("    id: {}", hit.id);
        println!();
    }
}

/// Print the top-`k` chunks for `query`, nearest first.
pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Search requires an embedding provider. Set [embedding] provider in config.");
    }
    let k = resolve_k(k, config)?;
    let pipeline = Pipeline::open(config, false).await?;

    progress.report(ProgressEvent::Searching {
        query: query.to_string(),
        k,
    });
    let hits = pipeline.retrieve(query, k).await?;
    print_hits(&hits);
    Ok(())
}

/// Answer a single question from the indexed documents.
pub async fn run_ask(
    config: &Config,
    query: &str,
    k: Option<usize>,
    output: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Ask requires an embedding provider. Set [embedding] provider in config.");
    }
    let k = resolve_k(k, config)?;
    let pipeline = Pipeline::open(config, true).await?;

    progress.report(ProgressEvent::Searching {
        query: query.to_string(),
        k,
    });
    let answer = pipeline.answer(query, k).await?;
    println!("{}", answer.trim());

    if let Some(path) = output {
        std::fs::write(path, answer.trim())
            .with_context(|| format!("Failed to write answer: {}", path.display()))?;
        eprintln!("Answer saved to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_k_rejects_zero() {
        let config = Config::default();
        assert_eq!(resolve_k(None, &config).unwrap(), 5);
        assert_eq!(resolve_k(Some(2), &config).unwrap(), 2);
        assert!(resolve_k(Some(0), &config).is_err());
    }

    #[test]
    fn preview_short_text_unchanged() {
        assert_eq!(preview("hello\nworld", 300), "hello world");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let text = "\u{e9}".repeat(400);
        let p = preview(&text, 300);
        assert_eq!(p.chars().count(), 303);
        assert!(p.ends_with("..."));
    }
}
