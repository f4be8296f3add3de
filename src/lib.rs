//! # SSR Harness
//!
//! A retrieval-augmented report writer for accreditation self-study reports.
//!
//! PDF source documents are extracted to text, split into fixed word-count
//! chunks, embedded, and indexed in SQLite. Report sections are then drafted
//! one at a time by retrieving the most relevant chunks for each section's
//! query, packing them into a bounded context, and asking an LLM to write the
//! section using only that context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │   PDFs   │──▶│ Extract  │──▶│   Chunk   │──▶│  Embed   │
//! │          │   │ + clean  │   │ N words   │   │ + index  │
//! └──────────┘   └──────────┘   └───────────┘   └────┬─────┘
//!                                                    │
//!      ┌─────────────────────────────────────────────┘
//!      ▼
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │ Retrieve │──▶│   Pack   │──▶│ Generate  │──▶│  Report  │
//! │  top-k   │   │  budget  │   │   (LLM)   │   │ (resume) │
//! └──────────┘   └──────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ssr init                          # create database
//! ssr ingest                        # extract, chunk, and index ./data/*.pdf
//! ssr search "student mentoring"    # inspect retrieval
//! ssr report                        # draft every section
//! ssr report --resume NAAC_Report_2026-01-20_20-01-22.txt
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction and cleaning |
//! | [`chunk`] | Word-count chunking and chunk files |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Similarity index (SQLite and in-memory) |
//! | [`index`] | Embedding chunks into the index |
//! | [`retrieve`] | Top-k similarity retrieval |
//! | [`context`] | Context packing under a character budget |
//! | [`generate`] | Prompt template and LLM client |
//! | [`pipeline`] | Shared embedder/index/generator context |
//! | [`report`] | Resumable multi-section report orchestrator |
//! | [`progress`] | Progress reporting on stderr |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod retrieve;
pub mod store;
