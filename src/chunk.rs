//! Fixed word-count chunker and on-disk chunk persistence.
//!
//! Cleaned text is split on whitespace and partitioned into groups of
//! exactly `chunk_size` words; the final group keeps the remainder.
//! Each chunk is written as `chunk_<index>.txt` under a directory named
//! after its source document. Because `chunk_10` sorts before `chunk_2`
//! lexically, [`load_chunks`] orders by the parsed numeric index.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::Chunk;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Split `text` into groups of `chunk_size` whitespace-separated words.
///
/// Empty (or whitespace-only) input yields no chunks. A `chunk_size` of
/// zero is rejected by config validation; here it is treated as 1 so the
/// function stays total.
pub fn chunk_words(text: &str, chunk_size: usize) -> Vec<String> {
    let size = chunk_size.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    words.chunks(size).map(|group| group.join(" ")).collect()
}

/// Chunk a document's cleaned text into [`Chunk`]s with contiguous indices.
pub fn build_chunks(document_id: &str, text: &str, chunk_size: usize) -> Vec<Chunk> {
    chunk_words(text, chunk_size)
        .into_iter()
        .enumerate()
        .map(|(i, t)| make_chunk(document_id, i, t))
        .collect()
}

pub fn make_chunk(document_id: &str, index: usize, text: String) -> Chunk {
    Chunk {
        document_id: document_id.to_string(),
        chunk_index: index,
        hash: hash_text(&text),
        text,
    }
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// File name for a chunk, e.g. `chunk_3.txt`.
pub fn chunk_file_name(index: usize) -> String {
    format!("chunk_{}.txt", index)
}

/// Parse the index out of a `chunk_<n>.txt` file name.
pub fn parse_chunk_file_name(name: &str) -> Option<usize> {
    name.strip_prefix("chunk_")?
        .strip_suffix(".txt")?
        .parse()
        .ok()
}

/// Persist chunks under `<chunks_dir>/<document_id>/`.
///
/// Chunk files left over from an earlier, longer run of the same
/// document are removed first so the directory always mirrors `chunks`.
pub fn write_chunks(chunks_dir: &Path, document_id: &str, chunks: &[Chunk]) -> Result<PathBuf> {
    let dir = chunks_dir.join(document_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create chunk directory: {}", dir.display()))?;

    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if parse_chunk_file_name(&name.to_string_lossy()).is_some() {
            std::fs::remove_file(entry.path())?;
        }
    }

    for chunk in chunks {
        let path = dir.join(chunk_file_name(chunk.chunk_index));
        std::fs::write(&path, &chunk.text)
            .with_context(|| format!("Failed to write chunk: {}", path.display()))?;
    }

    Ok(dir)
}

/// Load a document's chunks back from disk in numeric index order.
pub fn load_chunks(chunks_dir: &Path, document_id: &str) -> Result<Vec<Chunk>> {
    let dir = chunks_dir.join(document_id);
    let mut indexed: Vec<(usize, PathBuf)> = Vec::new();

    for entry in std::fs::read_dir(&dir)
        .with_context(|| format!("Failed to read chunk directory: {}", dir.display()))?
    {
        let entry = entry?;
        if let Some(idx) = parse_chunk_file_name(&entry.file_name().to_string_lossy()) {
            indexed.push((idx, entry.path()));
        }
    }
    indexed.sort_by_key(|(idx, _)| *idx);

    indexed
        .into_iter()
        .map(|(idx, path)| {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read chunk: {}", path.display()))?;
            Ok(make_chunk(document_id, idx, text))
        })
        .collect()
}

/// Chunk every cleaned `.txt` file into the chunks directory.
pub fn run_chunk(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    let cleaned_dir = &config.paths.cleaned_dir;
    let files = list_cleaned_files(cleaned_dir)?;

    let mut documents = 0u64;
    let mut total_chunks = 0u64;

    for path in &files {
        let document_id = match path.file_stem() {
            Some(stem) => stem.to_string_lossy().to_string(),
            None => continue,
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cleaned text: {}", path.display()))?;

        let chunks = build_chunks(&document_id, &text, config.chunking.chunk_size);
        let dir = write_chunks(&config.paths.chunks_dir, &document_id, &chunks)?;
        progress.report(ProgressEvent::Chunked {
            document: document_id,
            chunks: chunks.len(),
            dir: dir.display().to_string(),
        });

        documents += 1;
        total_chunks += chunks.len() as u64;
    }

    println!("chunk");
    println!("  documents: {}", documents);
    println!("  chunks written: {}", total_chunks);
    Ok(())
}

fn list_cleaned_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("Failed to read cleaned dir: {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("txt"))
                .unwrap_or(false)
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}
