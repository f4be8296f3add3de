//! Pipeline and report progress reporting.
//!
//! Every long-running command narrates what it is doing: which document is
//! being extracted or indexed, which report section is being generated,
//! when a rate limit forces a wait. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;
use std::time::Duration;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// A PDF was extracted and cleaned.
    Extracted { document: String, output: String },
    /// A PDF could not be extracted and was skipped.
    ExtractFailed { document: String, error: String },
    /// A cleaned document was split into chunks.
    Chunked {
        document: String,
        chunks: usize,
        dir: String,
    },
    /// Chunks of one document were written to the index.
    Indexed {
        document: String,
        embedded: u64,
        unchanged: u64,
    },
    /// Similarity query issued.
    Searching { query: String, k: usize },
    /// A report artifact was created or loaded.
    ReportOpened { path: String, resumed: bool },
    /// Sections found complete in a resumed artifact.
    AlreadyDone { titles: Vec<String> },
    /// Section skipped because it is already in the artifact.
    Skipping { title: String },
    /// Section generation started.
    Generating {
        n: usize,
        total: usize,
        title: String,
    },
    /// Artifact rewritten after a completed section.
    Saved { path: String },
    /// Upstream rate limit; sleeping before retry.
    RateLimited { attempt: u32, wait: Duration },
    /// Courtesy delay before the next section.
    Waiting { wait: Duration },
    /// All sections done.
    Complete { path: String },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Extracted { document, output } => {
                format!("extract {}  -> {}\n", document, output)
            }
            ProgressEvent::ExtractFailed { document, error } => {
                format!("extract {}  skipped: {}\n", document, error)
            }
            ProgressEvent::Chunked {
                document,
                chunks,
                dir,
            } => format!("chunk {}  {} chunks -> {}\n", document, chunks, dir),
            ProgressEvent::Indexed {
                document,
                embedded,
                unchanged,
            } => format!(
                "index {}  embedded {}, unchanged {}\n",
                document, embedded, unchanged
            ),
            ProgressEvent::Searching { query, k } => {
                format!("search  top {} for \"{}\"\n", k, query)
            }
            ProgressEvent::ReportOpened { path, resumed } => {
                if *resumed {
                    format!("report  resuming {}\n", path)
                } else {
                    format!("report  new file {}\n", path)
                }
            }
            ProgressEvent::AlreadyDone { titles } => {
                if titles.is_empty() {
                    "report  completed sections: (none)\n".to_string()
                } else {
                    let mut s = "report  completed sections:\n".to_string();
                    for t in titles {
                        s.push_str(&format!("  done  {}\n", t));
                    }
                    s
                }
            }
            ProgressEvent::Skipping { title } => {
                format!("report  skipping (already done): {}\n", title)
            }
            ProgressEvent::Generating { n, total, title } => {
                format!("report  ({}/{}) generating: {}\n", n, total, title)
            }
            ProgressEvent::Saved { path } => format!("report  saved progress -> {}\n", path),
            ProgressEvent::RateLimited { attempt, wait } => format!(
                "report  rate limit hit (attempt {}), waiting {}s before retrying\n",
                attempt,
                wait.as_secs()
            ),
            ProgressEvent::Waiting { wait } => {
                format!("report  waiting {}s before next section\n", wait.as_secs())
            }
            ProgressEvent::Complete { path } => {
                format!("report  complete -> {}\n", path)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Extracted { document, output } => serde_json::json!({
                "event": "extracted", "document": document, "output": output
            }),
            ProgressEvent::ExtractFailed { document, error } => serde_json::json!({
                "event": "extract_failed", "document": document, "error": error
            }),
            ProgressEvent::Chunked {
                document,
                chunks,
                dir,
            } => serde_json::json!({
                "event": "chunked", "document": document, "chunks": chunks, "dir": dir
            }),
            ProgressEvent::Indexed {
                document,
                embedded,
                unchanged,
            } => serde_json::json!({
                "event": "indexed", "document": document,
                "embedded": embedded, "unchanged": unchanged
            }),
            ProgressEvent::Searching { query, k } => serde_json::json!({
                "event": "searching", "query": query, "k": k
            }),
            ProgressEvent::ReportOpened { path, resumed } => serde_json::json!({
                "event": "report_opened", "path": path, "resumed": resumed
            }),
            ProgressEvent::AlreadyDone { titles } => serde_json::json!({
                "event": "already_done", "titles": titles
            }),
            ProgressEvent::Skipping { title } => serde_json::json!({
                "event": "skipping", "title": title
            }),
            ProgressEvent::Generating { n, total, title } => serde_json::json!({
                "event": "generating", "n": n, "total": total, "title": title
            }),
            ProgressEvent::Saved { path } => serde_json::json!({
                "event": "saved", "path": path
            }),
            ProgressEvent::RateLimited { attempt, wait } => serde_json::json!({
                "event": "rate_limited", "attempt": attempt, "wait_secs": wait.as_secs()
            }),
            ProgressEvent::Waiting { wait } => serde_json::json!({
                "event": "waiting", "wait_secs": wait.as_secs()
            }),
            ProgressEvent::Complete { path } => serde_json::json!({
                "event": "complete", "path": path
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human narration on a TTY, JSON lines when stderr is redirected.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Json
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode: '{}'. Use human, json, or off.", other),
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_modes() {
        assert_eq!(ProgressMode::parse("off").unwrap(), ProgressMode::Off);
        assert_eq!(ProgressMode::parse("json").unwrap(), ProgressMode::Json);
        assert_eq!(ProgressMode::parse("human").unwrap(), ProgressMode::Human);
        assert!(ProgressMode::parse("loud").is_err());
    }
}
