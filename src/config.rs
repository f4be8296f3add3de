//! TOML configuration parsing and validation.
//!
//! Every table carries serde defaults, so a config file only needs to
//! name what differs from the stock NAAC SSR setup. Validation happens
//! once in [`load_config`]; everything downstream trusts the values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
    #[serde(default = "default_cleaned_dir")]
    pub cleaned_dir: PathBuf,
    #[serde(default = "default_chunks_dir")]
    pub chunks_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            cleaned_dir: default_cleaned_dir(),
            chunks_dir: default_chunks_dir(),
            reports_dir: default_reports_dir(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_cleaned_dir() -> PathBuf {
    PathBuf::from("./cleaned_text")
}
fn default_chunks_dir() -> PathBuf {
    PathBuf::from("./chunks")
}
fn default_reports_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["*.pdf".to_string(), "*.PDF".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            collection: default_collection(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/index.sqlite")
}
fn default_collection() -> String {
    "naac_chunks".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Words per chunk; the last chunk of a document holds the remainder.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    /// Environment variable holding the API credential.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Pin a model (e.g. `models/gemini-1.5-flash`) instead of auto-selecting.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            api_key_env: default_api_key_env(),
            model: None,
            base_url: default_gemini_base_url(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// How a resumed run decides which sections are already in the artifact.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResumeDetection {
    /// The exact block header (rule, title, rule) must be present.
    #[default]
    Headers,
    /// The title appears anywhere in the artifact text.
    Substring,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SectionConfig {
    pub title: String,
    pub query: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_report_title")]
    pub title: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_report_top_k")]
    pub top_k: usize,
    #[serde(default = "default_base_wait_secs")]
    pub base_wait_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_section_delay_secs")]
    pub section_delay_secs: u64,
    /// Absent means retry rate-limited calls until they succeed.
    #[serde(default)]
    pub max_rate_limit_retries: Option<u32>,
    #[serde(default)]
    pub resume_detection: ResumeDetection,
    #[serde(default = "default_sections")]
    pub sections: Vec<SectionConfig>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_report_title(),
            file_prefix: default_file_prefix(),
            top_k: default_report_top_k(),
            base_wait_secs: default_base_wait_secs(),
            max_wait_secs: default_max_wait_secs(),
            section_delay_secs: default_section_delay_secs(),
            max_rate_limit_retries: None,
            resume_detection: ResumeDetection::default(),
            sections: default_sections(),
        }
    }
}

fn default_report_title() -> String {
    "NAAC SSR REPORT (AUTO-GENERATED)".to_string()
}
fn default_file_prefix() -> String {
    "NAAC_Report".to_string()
}
fn default_report_top_k() -> usize {
    3
}
fn default_base_wait_secs() -> u64 {
    30
}
fn default_max_wait_secs() -> u64 {
    300
}
fn default_section_delay_secs() -> u64 {
    60
}

fn section(title: &str, query: &str) -> SectionConfig {
    SectionConfig {
        title: title.to_string(),
        query: query.to_string(),
    }
}

/// The seven NAAC SSR criteria, in report order.
pub fn default_sections() -> Vec<SectionConfig> {
    vec![
        section(
            "Criterion 1 - Curricular Aspects",
            "Generate NAAC SSR content for Criterion 1: Curricular Aspects. \
             Include overview, curriculum planning, implementation, feedback mechanism, and outcomes.",
        ),
        section(
            "Criterion 2 - Teaching-Learning and Evaluation",
            "Generate NAAC SSR content for Criterion 2: Teaching-Learning and Evaluation. \
             Include student-centric methods, teacher profile, mentoring, evaluation methods, and outcomes.",
        ),
        section(
            "Criterion 3 - Research, Innovations and Extension",
            "Generate NAAC SSR content for Criterion 3: Research, Innovations and Extension. \
             Include research activities, publications, grants, innovation ecosystem, extension programs, and outcomes.",
        ),
        section(
            "Criterion 4 - Infrastructure and Learning Resources",
            "Generate NAAC SSR content for Criterion 4: Infrastructure and Learning Resources. \
             Include facilities, ICT infrastructure, library resources, labs, maintenance, and utilization.",
        ),
        section(
            "Criterion 5 - Student Support and Progression",
            "Generate NAAC SSR content for Criterion 5: Student Support and Progression. \
             Include scholarships, placement, training, student activities, progression, and alumni engagement.",
        ),
        section(
            "Criterion 6 - Governance, Leadership and Management",
            "Generate NAAC SSR content for Criterion 6: Governance, Leadership and Management. \
             Include vision/mission, organizational structure, strategy, faculty development, and financial management.",
        ),
        section(
            "Criterion 7 - Institutional Values and Best Practices",
            "Generate NAAC SSR content for Criterion 7: Institutional Values and Best Practices. \
             Include environmental initiatives, inclusivity, ethics, best practices, and institutional distinctiveness.",
        ),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_context_chars == 0 {
        anyhow::bail!("retrieval.max_context_chars must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }

    let report = &config.report;
    if report.top_k == 0 {
        anyhow::bail!("report.top_k must be >= 1");
    }
    if report.base_wait_secs == 0 {
        anyhow::bail!("report.base_wait_secs must be > 0");
    }
    if report.max_wait_secs < report.base_wait_secs {
        anyhow::bail!("report.max_wait_secs must be >= report.base_wait_secs");
    }
    if report.sections.is_empty() {
        anyhow::bail!("report.sections must not be empty");
    }
    let mut seen = HashSet::new();
    for s in &report.sections {
        if s.title.trim().is_empty() {
            anyhow::bail!("report.sections entries need a non-empty title");
        }
        if !seen.insert(s.title.as_str()) {
            anyhow::bail!("duplicate report section title: '{}'", s.title);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let cfg: Config = toml::from_str(toml_src)?;
        validate(&cfg)?;
        Ok(cfg)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.retrieval.max_context_chars, 6000);
        assert_eq!(cfg.db.collection, "naac_chunks");
        assert_eq!(cfg.report.sections.len(), 7);
        assert_eq!(cfg.report.base_wait_secs, 30);
        assert_eq!(cfg.report.max_wait_secs, 300);
        assert_eq!(cfg.report.resume_detection, ResumeDetection::Headers);
        assert_eq!(cfg.generation.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let err = parse("[chunking]\nchunk_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn enabled_embedding_requires_dims() {
        let err = parse("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n").unwrap_err();
        assert!(err.to_string().contains("dims"));
    }

    #[test]
    fn unknown_generation_provider_rejected() {
        let err = parse("[generation]\nprovider = \"other\"\n").unwrap_err();
        assert!(err.to_string().contains("generation provider"));
    }

    #[test]
    fn duplicate_section_titles_rejected() {
        let src = r#"
[[report.sections]]
title = "A"
query = "q1"

[[report.sections]]
title = "A"
query = "q2"
"#;
        let err = parse(src).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn wait_cap_below_base_rejected() {
        let err = parse("[report]\nbase_wait_secs = 60\nmax_wait_secs = 10\n").unwrap_err();
        assert!(err.to_string().contains("max_wait_secs"));
    }

    #[test]
    fn zero_base_wait_rejected() {
        let err = parse("[report]\nbase_wait_secs = 0\nmax_wait_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("base_wait_secs"));
    }

    #[test]
    fn substring_detection_parses() {
        let cfg = parse("[report]\nresume_detection = \"substring\"\n").unwrap();
        assert_eq!(cfg.report.resume_detection, ResumeDetection::Substring);
    }

    #[test]
    fn example_config_is_valid() {
        let cfg = parse(include_str!("../config/ssr.example.toml")).unwrap();
        assert_eq!(cfg.embedding.provider, "local");
        assert_eq!(cfg.embedding.dims, Some(384));
        assert_eq!(cfg.report.sections.len(), 7);
    }
}
