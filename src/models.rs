//! Core data models used throughout the pipeline.
//!
//! These types represent the chunks, index entries, and retrieval results
//! that flow from ingestion through to report generation.

use serde::Serialize;

/// An ordered word-count segment of one document's cleaned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Base name of the source document (the cleaned-text file stem).
    pub document_id: String,
    /// 0-based, contiguous within a document.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`, used to skip re-embedding unchanged chunks.
    pub hash: String,
}

/// A chunk plus its embedding, as written to the similarity index.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub id: String,
    pub source_file: String,
    pub chunk_name: String,
    pub chunk_index: usize,
    pub text: String,
    pub hash: String,
    pub embedding: Vec<f32>,
}

/// One hit from a similarity query. Lower distance means more similar.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub source_file: String,
    pub chunk_name: String,
    pub text: String,
    pub distance: f32,
}

/// Up to `k` hits ordered by increasing distance.
pub type RetrievalResult = Vec<RetrievedChunk>;
