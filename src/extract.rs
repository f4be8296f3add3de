//! PDF text extraction and cleaning.
//!
//! Extraction returns whatever plain text `pdf-extract` recovers; cleaning
//! then normalizes it for chunking: whitespace runs collapse to one space,
//! non-ASCII characters are dropped, and page-number artifacts
//! (`Page 12`, `3/40`) are removed.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::Config;
use crate::progress::{ProgressEvent, ProgressReporter};

#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn page_artifact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Page\s*\d+|\d+/\d+").expect("static regex"))
}

/// Normalize extracted text for chunking.
pub fn clean_text(text: &str) -> String {
    let collapsed = whitespace_re().replace_all(text, " ");
    let ascii: String = collapsed.chars().filter(|c| c.is_ascii()).collect();
    let stripped = page_artifact_re().replace_all(&ascii, "");
    stripped.trim().to_string()
}

/// Extract and clean one PDF file.
pub fn extract_and_clean(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let raw = extract_pdf_text(&bytes)?;
    Ok(clean_text(&raw))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(Glob::new(p).with_context(|| format!("Invalid include glob: {}", p))?);
    }
    Ok(builder.build()?)
}

/// List input documents in name order, filtered by `include_globs`.
pub fn list_documents(config: &Config) -> Result<Vec<PathBuf>> {
    let dir = &config.paths.documents_dir;
    let include = build_globset(&config.documents.include_globs)?;

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("Failed to read documents dir: {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if include.is_match(entry.file_name()) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// Extract every input PDF into `<cleaned_dir>/<stem>.txt`.
///
/// A PDF that fails to parse is reported and skipped; the rest of the
/// batch still runs.
pub fn run_extract(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    let out_dir = &config.paths.cleaned_dir;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let files = list_documents(config)?;
    let mut extracted = 0u64;
    let mut failed = 0u64;

    for path in &files {
        let stem = match path.file_stem() {
            Some(s) => s.to_string_lossy().to_string(),
            None => continue,
        };

        match extract_and_clean(path) {
            Ok(cleaned) => {
                let output = out_dir.join(format!("{}.txt", stem));
                std::fs::write(&output, cleaned)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                progress.report(ProgressEvent::Extracted {
                    document: stem,
                    output: output.display().to_string(),
                });
                extracted += 1;
            }
            Err(e) => {
                progress.report(ProgressEvent::ExtractFailed {
                    document: stem,
                    error: format!("{:#}", e),
                });
                failed += 1;
            }
        }
    }

    println!("extract");
    println!("  documents found: {}", files.len());
    println!("  extracted: {}", extracted);
    println!("  failed: {}", failed);
    Ok(())
}
