//! # SSR Harness CLI (`ssr`)
//!
//! The `ssr` binary builds the document index and drafts the report.
//!
//! ## Usage
//!
//! ```bash
//! ssr --config ./config/ssr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ssr init` | Create the SQLite database and working directories |
//! | `ssr extract` | Extract and clean text from every input PDF |
//! | `ssr chunk` | Split cleaned text into fixed word-count chunks |
//! | `ssr index` | Embed chunks into the similarity index |
//! | `ssr ingest` | `extract`, `chunk`, and `index` in one go |
//! | `ssr search "<query>"` | Show the nearest chunks for a query |
//! | `ssr ask "<query>"` | Answer one question from the documents |
//! | `ssr report` | Generate (or resume) the full report |
//! | `ssr sections` | List report sections and their status |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from ./data/*.pdf
//! ssr ingest --config ./config/ssr.toml
//!
//! # Re-embed everything after switching to a model with the same dims.
//! # A model with different dims needs a fresh db.path or db.collection.
//! ssr index --force
//!
//! # Continue an interrupted report
//! ssr report --resume ./NAAC_Report_2026-01-20_20-01-22.txt
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ssr_harness::progress::ProgressMode;
use ssr_harness::{ask, chunk, config, extract, ingest, migrate, report};

/// SSR Harness CLI: retrieval-augmented drafting of accreditation reports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ssr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ssr",
    about = "SSR Harness: retrieval-augmented drafting of accreditation self-study reports",
    version,
    long_about = "SSR Harness extracts text from PDF source documents, chunks and embeds it into \
    a local SQLite index, and drafts each report section with an LLM grounded in the retrieved \
    chunks. Report runs persist after every section and can be resumed."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ssr.toml`. A missing file is an error; every
    /// key inside it is optional.
    #[arg(long, global = true, default_value = "./config/ssr.toml")]
    config: PathBuf,

    /// Progress output on stderr: `human`, `json`, or `off`.
    ///
    /// Defaults to `human` on a terminal and `json` otherwise.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and working directories.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Extract and clean text from every PDF in the documents directory.
    ///
    /// Writes `<cleaned_dir>/<name>.txt` per PDF. Unreadable PDFs are
    /// reported and skipped.
    Extract,

    /// Split every cleaned text file into fixed word-count chunks.
    Chunk,

    /// Embed persisted chunks into the similarity index.
    ///
    /// Chunks whose content is unchanged since the last run are skipped.
    Index {
        /// Re-embed every chunk, even if unchanged.
        ///
        /// Only works for a model with the same dimensionality as the
        /// existing index; a different-dims model needs a fresh `db.path`
        /// or `db.collection`.
        #[arg(long)]
        force: bool,
    },

    /// Run `extract`, `chunk`, and `index` in sequence.
    Ingest {
        /// Re-embed every chunk, even if unchanged (same-dims models only).
        #[arg(long)]
        force: bool,
    },

    /// Show the chunks nearest to a query.
    Search {
        /// The search query string.
        query: String,

        /// Number of results (defaults to `[retrieval].top_k`).
        #[arg(long, value_parser = positive_k)]
        k: Option<usize>,
    },

    /// Answer a single question from the indexed documents.
    Ask {
        /// The question or task.
        query: String,

        /// Number of chunks to retrieve (defaults to `[retrieval].top_k`).
        #[arg(long, value_parser = positive_k)]
        k: Option<usize>,

        /// Also write the answer to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Generate every report section, or resume a partial report.
    ///
    /// The report file is rewritten after each completed section, so an
    /// interrupted run can be continued with `--resume`.
    Report {
        /// Existing report file to continue.
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Chunks retrieved per section (defaults to `[report].top_k`).
        #[arg(long, value_parser = positive_k)]
        k: Option<usize>,
    },

    /// List configured report sections.
    Sections {
        /// Mark each section done or pending against this report file.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

/// Parse `--k`; zero would retrieve nothing and generate from empty context.
fn positive_k(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("k must be at least 1".to_string()),
        Ok(k) => Ok(k),
        Err(e) => Err(format!("invalid k '{}': {}", s, e)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mode = match cli.progress.as_deref() {
        Some(s) => ProgressMode::parse(s)?,
        None => ProgressMode::default_for_tty(),
    };
    let progress = mode.reporter();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            for dir in [
                &cfg.paths.documents_dir,
                &cfg.paths.cleaned_dir,
                &cfg.paths.chunks_dir,
                &cfg.paths.reports_dir,
            ] {
                std::fs::create_dir_all(dir)?;
            }
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Extract => {
            extract::run_extract(&cfg, progress.as_ref())?;
        }
        Commands::Chunk => {
            chunk::run_chunk(&cfg, progress.as_ref())?;
        }
        Commands::Index { force } => {
            ingest::run_index(&cfg, force, progress.as_ref()).await?;
        }
        Commands::Ingest { force } => {
            ingest::run_ingest(&cfg, force, progress.as_ref()).await?;
        }
        Commands::Search { query, k } => {
            ask::run_search(&cfg, &query, k, progress.as_ref()).await?;
        }
        Commands::Ask { query, k, output } => {
            ask::run_ask(&cfg, &query, k, output.as_deref(), progress.as_ref()).await?;
        }
        Commands::Report { resume, k } => {
            report::run_report(&cfg, resume, k, progress.as_ref()).await?;
        }
        Commands::Sections { report } => {
            report::run_sections(&cfg, report.as_deref())?;
        }
    }

    Ok(())
}
