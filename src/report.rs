//! Resumable multi-section report generation.
//!
//! The orchestrator walks a fixed, ordered list of [`ReportSection`]s. Each
//! pending section is answered through [`Pipeline::answer`], appended to the
//! in-memory [`ReportState`], and the whole artifact is rewritten on disk
//! before moving on. A run killed at any point leaves the artifact holding
//! every section completed so far; re-running with the same file resumes
//! from the first missing section.
//!
//! ```text
//!   load/create artifact ──▶ mark DONE sections
//!            │
//!            ▼
//!   for each PENDING section (in order):
//!       IN_PROGRESS ── answer() ──┬── ok ──▶ append, persist, DONE, delay
//!                                 ├── rate limited ──▶ backoff, retry
//!                                 └── other error ──▶ abort (artifact intact)
//! ```
//!
//! Rate limits are recognized from the error text (`429`,
//! `ResourceExhausted`, `quota`). Waits start at `base_wait`, double per
//! retry, and are capped at `max_wait`; by default there is no retry limit.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Config, ResumeDetection, SectionConfig};
use crate::pipeline::Pipeline;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Width of the `=` rules framing the header and every section.
pub const RULE_WIDTH: usize = 70;

pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub title: String,
    pub query: String,
}

impl From<&SectionConfig> for ReportSection {
    fn from(s: &SectionConfig) -> Self {
        Self {
            title: s.title.clone(),
            query: s.query.clone(),
        }
    }
}

pub fn sections_from_config(config: &Config) -> Vec<ReportSection> {
    config.report.sections.iter().map(ReportSection::from).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStatus {
    Pending,
    InProgress,
    Done,
}

/// The rendered report: header plus completed section blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportState {
    text: String,
}

impl ReportState {
    /// Fresh report with only the header block.
    pub fn new(title: &str, generated_on: DateTime<Local>) -> Self {
        let rule = rule();
        let text = format!(
            "{title}\n{rule}\nGenerated On: {ts}\n{rule}\n\n",
            title = title,
            rule = rule,
            ts = generated_on.format("%Y-%m-%d %H:%M:%S"),
        );
        Self { text }
    }

    /// Wrap an existing artifact. CRLF line endings are normalized so
    /// header detection works on files saved by Windows tools.
    pub fn from_text(text: String) -> Self {
        if text.contains("\r\n") {
            Self {
                text: text.replace("\r\n", "\n"),
            }
        } else {
            Self { text }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn append_section(&mut self, title: &str, generated: &str) {
        self.text.push_str(&section_block(title, generated));
    }

    /// Whether `title` is already present in the artifact.
    pub fn contains_section(&self, title: &str, detection: ResumeDetection) -> bool {
        match detection {
            ResumeDetection::Headers => self.text.contains(&header_marker(title)),
            ResumeDetection::Substring => self.text.contains(title),
        }
    }
}

/// Render one section block: rule, title, rule, blank line, trimmed text.
pub fn section_block(title: &str, generated: &str) -> String {
    let rule = rule();
    format!(
        "\n{rule}\n{title}\n{rule}\n\n{body}\n\n",
        rule = rule,
        title = title,
        body = generated.trim()
    )
}

fn header_marker(title: &str) -> String {
    let rule = rule();
    format!("{rule}\n{title}\n{rule}\n", rule = rule, title = title)
}

/// Initial status of every section given the loaded artifact.
pub fn initial_statuses(
    sections: &[ReportSection],
    state: &ReportState,
    detection: ResumeDetection,
) -> Vec<SectionStatus> {
    sections
        .iter()
        .map(|s| {
            if state.contains_section(&s.title, detection) {
                SectionStatus::Done
            } else {
                SectionStatus::Pending
            }
        })
        .collect()
}

/// `<reports_dir>/<prefix>_<YYYY-MM-DD_HH-MM-SS>.txt`
pub fn timestamped_report_path(config: &Config, now: DateTime<Local>) -> PathBuf {
    config.paths.reports_dir.join(format!(
        "{}_{}.txt",
        config.report.file_prefix,
        now.format("%Y-%m-%d_%H-%M-%S")
    ))
}

/// Load an existing artifact, or start a new one. Returns `(state, resumed)`.
pub fn load_or_create(path: &Path, title: &str) -> Result<(ReportState, bool)> {
    if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report: {}", path.display()))?;
        Ok((ReportState::from_text(text), true))
    } else {
        Ok((ReportState::new(title, Local::now()), false))
    }
}

/// Overwrite the artifact with the full report.
///
/// Writes a sibling temp file and renames it over the target so a crash
/// mid-write never leaves a truncated artifact.
pub fn persist(path: &Path, state: &ReportState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, state.text())
        .with_context(|| format!("Failed to write report: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace report: {}", path.display()))?;
    Ok(())
}

/// Whether an error from the generation API is a rate limit.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    let msg = format!("{:#}", err);
    msg.contains("429") || msg.contains("ResourceExhausted") || msg.to_lowercase().contains("quota")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_wait: Duration,
    pub max_wait: Duration,
    /// `None` retries until the call succeeds.
    pub max_retries: Option<u32>,
}

impl BackoffPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_wait: Duration::from_secs(config.report.base_wait_secs),
            max_wait: Duration::from_secs(config.report.max_wait_secs),
            max_retries: config.report.max_rate_limit_retries,
        }
    }

    pub fn next_wait(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_wait)
    }
}

/// Run `op`, sleeping and retrying while it fails with a rate limit.
///
/// Any other error is returned immediately.
pub async fn call_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    progress: &dyn ProgressReporter,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut wait = policy.base_wait;
    let mut attempt: u32 = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_rate_limited(&e) => {
                if let Some(max) = policy.max_retries {
                    if attempt > max {
                        return Err(e.context(format!(
                            "still rate limited after {} retries",
                            max
                        )));
                    }
                }
                progress.report(ProgressEvent::RateLimited { attempt, wait });
                tokio::time::sleep(wait).await;
                wait = policy.next_wait(wait);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub output: PathBuf,
    pub title: String,
    pub top_k: usize,
    pub section_delay: Duration,
    pub backoff: BackoffPolicy,
    pub detection: ResumeDetection,
}

impl ReportOptions {
    /// Options from config. `resume` names an artifact to continue; otherwise
    /// a new timestamped file is used.
    pub fn from_config(config: &Config, resume: Option<PathBuf>, top_k: Option<usize>) -> Self {
        Self {
            output: resume.unwrap_or_else(|| timestamped_report_path(config, Local::now())),
            title: config.report.title.clone(),
            top_k: top_k.unwrap_or(config.report.top_k),
            section_delay: Duration::from_secs(config.report.section_delay_secs),
            backoff: BackoffPolicy::from_config(config),
            detection: config.report.resume_detection,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub path: PathBuf,
    pub resumed: bool,
    pub statuses: Vec<SectionStatus>,
    /// Titles generated in this run, in order.
    pub generated: Vec<String>,
}

/// Generate every pending section into the artifact at `opts.output`.
pub async fn generate_report(
    pipeline: &Pipeline,
    sections: &[ReportSection],
    opts: &ReportOptions,
    progress: &dyn ProgressReporter,
) -> Result<ReportOutcome> {
    if opts.top_k == 0 {
        bail!("report top_k must be >= 1");
    }
    let path = opts.output.clone();
    let (mut state, resumed) = load_or_create(&path, &opts.title)?;
    progress.report(ProgressEvent::ReportOpened {
        path: path.display().to_string(),
        resumed,
    });

    let mut statuses = initial_statuses(sections, &state, opts.detection);
    progress.report(ProgressEvent::AlreadyDone {
        titles: sections
            .iter()
            .zip(&statuses)
            .filter(|(_, st)| **st == SectionStatus::Done)
            .map(|(s, _)| s.title.clone())
            .collect(),
    });

    let total = sections.len();
    let mut generated = Vec::new();

    for (idx, section) in sections.iter().enumerate() {
        if statuses[idx] == SectionStatus::Done {
            progress.report(ProgressEvent::Skipping {
                title: section.title.clone(),
            });
            continue;
        }

        statuses[idx] = SectionStatus::InProgress;
        progress.report(ProgressEvent::Generating {
            n: idx + 1,
            total,
            title: section.title.clone(),
        });

        let text = call_with_backoff(&opts.backoff, progress, || {
            pipeline.answer(&section.query, opts.top_k)
        })
        .await
        .with_context(|| format!("Failed to generate section '{}'", section.title))?;

        state.append_section(&section.title, &text);
        persist(&path, &state)?;
        statuses[idx] = SectionStatus::Done;
        generated.push(section.title.clone());
        progress.report(ProgressEvent::Saved {
            path: path.display().to_string(),
        });

        let more_pending = statuses[idx + 1..].contains(&SectionStatus::Pending);
        if more_pending && !opts.section_delay.is_zero() {
            progress.report(ProgressEvent::Waiting {
                wait: opts.section_delay,
            });
            tokio::time::sleep(opts.section_delay).await;
        }
    }

    // A fully resumed artifact is never rewritten; a fresh one always is.
    if !resumed && generated.is_empty() {
        persist(&path, &state)?;
    }

    progress.report(ProgressEvent::Complete {
        path: path.display().to_string(),
    });

    Ok(ReportOutcome {
        path,
        resumed,
        statuses,
        generated,
    })
}

/// Status of each configured section for an existing artifact.
pub fn section_statuses(
    sections: &[ReportSection],
    report: &Path,
    detection: ResumeDetection,
) -> Result<Vec<SectionStatus>> {
    let text = std::fs::read_to_string(report)
        .with_context(|| format!("Failed to read report: {}", report.display()))?;
    Ok(initial_statuses(
        sections,
        &ReportState::from_text(text),
        detection,
    ))
}

/// `ssr report`: open the pipeline with a generator and run every section.
pub async fn run_report(
    config: &Config,
    resume: Option<PathBuf>,
    top_k: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Report generation requires an embedding provider. Set [embedding] provider in config.");
    }
    let pipeline = Pipeline::open(config, true).await?;
    let opts = ReportOptions::from_config(config, resume, top_k);
    let sections = sections_from_config(config);

    let outcome = generate_report(&pipeline, &sections, &opts, progress).await?;

    println!("report");
    println!("  file: {}", outcome.path.display());
    println!("  model: {}", pipeline.generator.model_name());
    println!("  sections: {}", sections.len());
    println!("  generated this run: {}", outcome.generated.len());
    println!(
        "  already done: {}",
        sections.len() - outcome.generated.len()
    );
    Ok(())
}

/// `ssr sections`: list configured sections, with status when a report is given.
pub fn run_sections(config: &Config, report: Option<&Path>) -> Result<()> {
    let sections = sections_from_config(config);
    let statuses = match report {
        Some(path) => Some(section_statuses(
            &sections,
            path,
            config.report.resume_detection,
        )?),
        None => None,
    };

    for (i, section) in sections.iter().enumerate() {
        match statuses.as_ref().map(|s| s[i]) {
            Some(SectionStatus::Done) => println!("{}. [done]    {}", i + 1, section.title),
            Some(_) => println!("{}. [pending] {}", i + 1, section.title),
            None => println!("{}. {}", i + 1, section.title),
        }
        println!("    query: {}", section.query);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn sections() -> Vec<ReportSection> {
        (1..=4)
            .map(|i| ReportSection {
                title: format!("Criterion {} - Area {}", i, i),
                query: format!("query {}", i),
            })
            .collect()
    }

    #[test]
    fn header_layout() {
        let ts = Local.with_ymd_and_hms(2026, 1, 20, 20, 1, 22).unwrap();
        let state = ReportState::new("NAAC SSR REPORT (AUTO-GENERATED)", ts);
        let lines: Vec<&str> = state.text().lines().collect();
        assert_eq!(lines[0], "NAAC SSR REPORT (AUTO-GENERATED)");
        assert_eq!(lines[1], "=".repeat(70));
        assert_eq!(lines[2], "Generated On: 2026-01-20 20:01:22");
        assert_eq!(lines[3], "=".repeat(70));
        assert!(state.text().ends_with("\n\n"));
    }

    #[test]
    fn section_block_layout() {
        let block = section_block("Criterion 1 - Curricular Aspects", "  Overview text \n");
        let expected = format!(
            "\n{r}\nCriterion 1 - Curricular Aspects\n{r}\n\nOverview text\n\n",
            r = "=".repeat(70)
        );
        assert_eq!(block, expected);
    }

    #[test]
    fn resume_detects_done_sections() {
        let s = sections();
        let mut state = ReportState::from_text("HEADER\n".to_string());
        state.append_section(&s[0].title, "one");
        state.append_section(&s[2].title, "three");

        let statuses = initial_statuses(&s, &state, ResumeDetection::Headers);
        assert_eq!(
            statuses,
            vec![
                SectionStatus::Done,
                SectionStatus::Pending,
                SectionStatus::Done,
                SectionStatus::Pending
            ]
        );
    }

    #[test]
    fn header_detection_ignores_echoed_titles() {
        let s = sections();
        let mut state = ReportState::from_text(String::new());
        state.append_section(&s[0].title, &format!("See also {} for details.", s[1].title));

        let by_header = initial_statuses(&s, &state, ResumeDetection::Headers);
        assert_eq!(by_header[1], SectionStatus::Pending);

        let by_substring = initial_statuses(&s, &state, ResumeDetection::Substring);
        assert_eq!(by_substring[1], SectionStatus::Done);
    }

    #[test]
    fn crlf_artifact_resumes_by_header() {
        let s = sections();
        let r = "=".repeat(70);
        let text = format!(
            "HDR\r\n{r}\r\nGenerated On: x\r\n{r}\r\n\r\n\r\n{r}\r\n{t}\r\n{r}\r\n\r\nbody\r\n\r\n",
            r = r,
            t = s[0].title
        );
        let state = ReportState::from_text(text);
        assert!(!state.text().contains('\r'));

        let statuses = initial_statuses(&s, &state, ResumeDetection::Headers);
        assert_eq!(statuses[0], SectionStatus::Done);
        assert!(statuses[1..].iter().all(|st| *st == SectionStatus::Pending));
    }

    #[test]
    fn crlf_file_loads_normalized() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("win.txt");
        let mut state = ReportState::from_text("HDR\n".to_string());
        state.append_section("Criterion 9 - Extra", "text");
        std::fs::write(&path, state.text().replace('\n', "\r\n")).unwrap();

        let (loaded, resumed) = load_or_create(&path, "unused").unwrap();
        assert!(resumed);
        assert!(loaded.contains_section("Criterion 9 - Extra", ResumeDetection::Headers));
    }

    #[test]
    fn backoff_saturates_on_huge_waits() {
        let policy = BackoffPolicy {
            base_wait: Duration::MAX,
            max_wait: Duration::MAX,
            max_retries: None,
        };
        assert_eq!(policy.next_wait(Duration::MAX), Duration::MAX);
    }

    #[test]
    fn rate_limit_classification() {
        assert!(is_rate_limited(&anyhow::anyhow!(
            "Gemini API error 429 Too Many Requests: {{}}"
        )));
        assert!(is_rate_limited(&anyhow::anyhow!("ResourceExhausted: try later")));
        assert!(is_rate_limited(&anyhow::anyhow!("Quota exceeded for metric")));
        assert!(is_rate_limited(
            &anyhow::anyhow!("HTTP 429").context("Failed to generate section")
        ));
        assert!(!is_rate_limited(&anyhow::anyhow!("Gemini API error 400 Bad Request")));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = BackoffPolicy {
            base_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(300),
            max_retries: None,
        };
        let mut w = policy.base_wait;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(w.as_secs());
            w = policy.next_wait(w);
        }
        assert_eq!(seen, vec![30, 60, 120, 240, 300, 300]);
    }

    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_retries_rate_limits_then_succeeds() {
        let policy = BackoffPolicy {
            base_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(300),
            max_retries: None,
        };
        let recorder = Recorder(Mutex::new(Vec::new()));
        let calls = Mutex::new(0u32);

        let out = call_with_backoff(&policy, &recorder, || {
            let n = {
                let mut c = calls.lock().unwrap();
                *c += 1;
                *c
            };
            async move {
                if n <= 3 {
                    anyhow::bail!("429 RESOURCE_EXHAUSTED")
                }
                Ok("done")
            }
        })
        .await
        .unwrap();

        assert_eq!(out, "done");
        let waits: Vec<u64> = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::RateLimited { wait, .. } => Some(wait.as_secs()),
                _ => None,
            })
            .collect();
        assert_eq!(waits, vec![30, 60, 120]);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_gives_up_after_max_retries() {
        let policy = BackoffPolicy {
            base_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(4),
            max_retries: Some(2),
        };
        let calls = Mutex::new(0u32);
        let result: Result<()> = call_with_backoff(&policy, &NoProgress, || {
            *calls.lock().unwrap() += 1;
            async { Err::<(), _>(anyhow::anyhow!("quota exceeded")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn other_errors_propagate_immediately() {
        let policy = BackoffPolicy {
            base_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(300),
            max_retries: None,
        };
        let calls = Mutex::new(0u32);
        let result: Result<()> = call_with_backoff(&policy, &NoProgress, || {
            *calls.lock().unwrap() += 1;
            async { Err::<(), _>(anyhow::anyhow!("invalid argument")) }
        })
        .await;

        assert!(result.unwrap_err().to_string().contains("invalid argument"));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn persist_overwrites_whole_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("report.txt");
        persist(&path, &ReportState::from_text("first version, longer".to_string())).unwrap();
        persist(&path, &ReportState::from_text("second".to_string())).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!tmp.path().join("report.txt.tmp").exists());
    }

    #[test]
    fn timestamped_path_uses_prefix() {
        let mut config = Config::default();
        config.paths.reports_dir = PathBuf::from("/tmp/reports");
        let ts = Local.with_ymd_and_hms(2026, 1, 20, 20, 1, 22).unwrap();
        assert_eq!(
            timestamped_report_path(&config, ts),
            PathBuf::from("/tmp/reports/NAAC_Report_2026-01-20_20-01-22.txt")
        );
    }
}
