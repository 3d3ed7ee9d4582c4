//! Summary report rendering
//!
//! Rendering is a pure function of the summary, the output root, and the
//! generation timestamp handed in by the caller. Two renders of the same
//! inputs are byte-identical.

use crate::config::ReportFormat;
use crate::core::{BatchSummary, ErrorOrigin, JobStatus, OutcomeRecord};
use crate::error::{IoResultExt, Result};
use crate::intake::SkippedCandidate;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Terminal sections in report order
const SECTIONS: [JobStatus; 4] = [
    JobStatus::Succeeded,
    JobStatus::Failed,
    JobStatus::TimedOut,
    JobStatus::Error,
];

/// Shown in place of a success rate when nothing was dispatched
pub const NO_TASKS: &str = "no tasks";

/// A summary bound to its output root and generation time
#[derive(Debug, Clone)]
pub struct SummaryReport<'a> {
    summary: &'a BatchSummary,
    output_dir: PathBuf,
    generated_at: DateTime<Utc>,
}

impl<'a> SummaryReport<'a> {
    /// Create a report
    pub fn new(summary: &'a BatchSummary, output_dir: impl Into<PathBuf>, generated_at: DateTime<Utc>) -> Self {
        Self {
            summary,
            output_dir: output_dir.into(),
            generated_at,
        }
    }

    /// Success rate as displayed, or [`NO_TASKS`]
    pub fn success_rate_text(&self) -> String {
        match self.summary.success_rate() {
            Some(rate) => format!("{:.2}%", rate),
            None => NO_TASKS.to_string(),
        }
    }

    /// Render in `format`
    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => self.render_json(),
        }
    }

    /// Human-readable report
    pub fn render_text(&self) -> String {
        let s = self.summary;
        let mut out = String::new();

        let _ = writeln!(out, "=== FoldBatch Run Summary ===");
        let _ = writeln!(out, "Generated:        {}", timestamp(&self.generated_at));
        let _ = writeln!(out, "Output directory: {}", self.output_dir.display());
        let _ = writeln!(out);
        let _ = writeln!(out, "Candidates:   {}", s.total_candidates());
        let _ = writeln!(out, "Skipped:      {}", s.skipped.len());
        let _ = writeln!(out, "Dispatched:   {}", s.total());
        for status in SECTIONS {
            let _ = writeln!(out, "{:<13} {}", format!("{}:", status.title()), s.bucket(status).len());
        }
        let _ = writeln!(out, "Success rate: {}", self.success_rate_text());
        if s.resolution_errors() + s.interrupted() > 0 {
            let _ = writeln!(
                out,
                "Errors by origin: {} launch, {} resolution, {} interrupted",
                s.launch_errors(),
                s.resolution_errors(),
                s.interrupted()
            );
        }
        if s.interrupted() > 0 {
            let _ = writeln!(out);
            let _ = writeln!(out, "Run was interrupted; interrupted jobs were stopped or never started.");
        }

        if s.total() == 0 {
            let _ = writeln!(out);
            let _ = writeln!(out, "No tasks were dispatched.");
        }

        for status in SECTIONS {
            let records = s.bucket(status);
            if records.is_empty() {
                continue;
            }
            let _ = writeln!(out);
            let _ = writeln!(out, "=== {} ({}) ===", status.title(), records.len());
            for record in records {
                write_entry(&mut out, record);
            }
        }

        if !s.skipped.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "=== Skipped ({}) ===", s.skipped.len());
            for skipped in &s.skipped {
                let _ = writeln!(out, "  {}", skipped.path.display());
                write_diagnostic(&mut out, &skipped.reason);
            }
        }

        out
    }

    /// JSON report
    pub fn render_json(&self) -> Result<String> {
        let s = self.summary;
        let document = ReportDocument {
            generated_at: timestamp(&self.generated_at),
            output_dir: &self.output_dir,
            counts: Counts {
                candidates: s.total_candidates(),
                skipped: s.skipped.len(),
                dispatched: s.total(),
                succeeded: s.succeeded.len(),
                failed: s.failed.len(),
                timed_out: s.timed_out.len(),
                error: s.errors.len(),
                resolution_errors: s.resolution_errors(),
                interrupted: s.interrupted(),
            },
            success_rate: s.success_rate(),
            succeeded: s.succeeded.iter().map(EntryView::from).collect(),
            failed: s.failed.iter().map(EntryView::from).collect(),
            timed_out: s.timed_out.iter().map(EntryView::from).collect(),
            error: s.errors.iter().map(EntryView::from).collect(),
            skipped: &s.skipped,
        };
        let mut json = serde_json::to_string_pretty(&document)?;
        json.push('\n');
        Ok(json)
    }

    /// Render and write to `path`
    pub fn write(&self, path: &Path, format: ReportFormat) -> Result<()> {
        let content = self.render(format)?;
        std::fs::write(path, content).with_path(path)?;
        tracing::info!(path = %path.display(), "Summary report written");
        Ok(())
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Durations at millisecond precision
fn format_duration(duration: Duration) -> String {
    let millis = Duration::from_millis(duration.as_millis() as u64);
    humantime::format_duration(millis).to_string()
}

fn write_entry(out: &mut String, record: &OutcomeRecord) {
    let job = &record.job;
    let mut line = format!("  {}  [{}]", job.id, job.device_label());
    if let Some(duration) = job.duration {
        let _ = write!(line, "  {}", format_duration(duration));
    }
    if let Some(code) = record.exit_code.filter(|c| *c != 0) {
        let _ = write!(line, "  exit {}", code);
    }
    if let Some(origin) = record.origin {
        let _ = write!(line, "  ({} error)", origin);
    }
    let _ = writeln!(out, "{}", line);
    if let Some(diagnostic) = &job.error {
        write_diagnostic(out, diagnostic);
    }
}

fn write_diagnostic(out: &mut String, text: &str) {
    for line in text.trim().lines() {
        let _ = writeln!(out, "      {}", line.trim_end());
    }
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    generated_at: String,
    output_dir: &'a Path,
    counts: Counts,
    success_rate: Option<f64>,
    succeeded: Vec<EntryView<'a>>,
    failed: Vec<EntryView<'a>>,
    timed_out: Vec<EntryView<'a>>,
    error: Vec<EntryView<'a>>,
    skipped: &'a [SkippedCandidate],
}

#[derive(Serialize)]
struct Counts {
    candidates: usize,
    skipped: usize,
    dispatched: usize,
    succeeded: usize,
    failed: usize,
    timed_out: usize,
    error: usize,
    resolution_errors: usize,
    interrupted: usize,
}

#[derive(Serialize)]
struct EntryView<'a> {
    id: &'a str,
    input: &'a Path,
    device: Option<u32>,
    device_label: String,
    status: JobStatus,
    duration_secs: Option<f64>,
    exit_code: Option<i32>,
    origin: Option<ErrorOrigin>,
    diagnostic: Option<&'a str>,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl<'a> From<&'a OutcomeRecord> for EntryView<'a> {
    fn from(record: &'a OutcomeRecord) -> Self {
        let job = &record.job;
        Self {
            id: &job.id,
            input: &job.input,
            device: job.device,
            device_label: job.device_label(),
            status: job.status(),
            duration_secs: job.duration.map(|d| d.as_secs_f64()),
            exit_code: record.exit_code,
            origin: record.origin,
            diagnostic: job.error.as_deref().map(str::trim),
            started_at: job.started_at.as_ref().map(timestamp),
            finished_at: job.finished_at.as_ref().map(timestamp),
        }
    }
}
