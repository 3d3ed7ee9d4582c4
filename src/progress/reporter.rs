//! Progress reporter implementation
//!
//! Uses indicatif for a batch-level bar with:
//! - Completed job count
//! - Elapsed time and ETA
//! - A status line showing what is currently running
//! - A closing tally of outcomes
//!
//! Counters are atomics so workers on any runtime thread can report
//! without locking.

use crate::core::JobStatus;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Progress reporter for a batch run
pub struct ProgressReporter {
    multi: MultiProgress,
    /// Completed jobs out of total
    jobs_bar: ProgressBar,
    /// Current status message
    status: ProgressBar,
    running: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    errors: AtomicU64,
    enabled: AtomicBool,
}

impl ProgressReporter {
    /// Create a reporter for `total` jobs
    pub fn new(total: u64) -> Self {
        Self::build(total, MultiProgress::new(), true)
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        Self::build(0, MultiProgress::with_draw_target(ProgressDrawTarget::hidden()), false)
    }

    fn build(total: u64, multi: MultiProgress, enabled: bool) -> Self {
        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        if enabled {
            status.enable_steady_tick(Duration::from_millis(120));
        }

        let jobs_bar = multi.add(ProgressBar::new(total));
        jobs_bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} jobs ({elapsed_precise}, ETA {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        jobs_bar.set_prefix("Jobs");

        Self {
            multi,
            jobs_bar,
            status,
            running: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// A worker picked up `job`
    pub fn job_started(&self, job: &str) {
        let running = self.running.fetch_add(1, Ordering::Relaxed) + 1;
        self.status
            .set_message(format!("{} running, started {}", running, truncate(job)));
    }

    /// `job` reached `status`
    pub fn job_finished(&self, job: &str, status: JobStatus) {
        let counter = match status {
            JobStatus::Succeeded => &self.succeeded,
            JobStatus::Failed => &self.failed,
            JobStatus::TimedOut => &self.timed_out,
            _ => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        // Jobs that never started were not counted as running.
        let running = self
            .running
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0)
            .saturating_sub(1);
        self.jobs_bar.inc(1);

        let mark = match status {
            JobStatus::Succeeded => style("✓").green(),
            JobStatus::TimedOut => style("⏱").yellow(),
            _ => style("✗").red(),
        };
        self.status
            .set_message(format!("{} running, {} {} {}", running, mark, truncate(job), status));

        // Keep a permanent line above the bars for anything that needs a look.
        if status != JobStatus::Succeeded && self.is_enabled() {
            let _ = self.multi.println(format!("{} {} {}", mark, job, status));
        }
    }

    /// Finish progress with the final tally
    pub fn finish(&self) {
        self.status.finish_with_message(format!("✓ {}", self.tally()));
        self.jobs_bar.finish();
    }

    /// Abandon progress, e.g. after an interrupt, keeping the tally so far
    pub fn finish_error(&self, reason: &str) {
        self.status
            .finish_with_message(format!("✗ {}: {}", reason, self.tally()));
        self.jobs_bar.abandon();
    }

    /// Check if progress is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn tally(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} timed out, {} errors",
            self.succeeded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.timed_out.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }
}

fn truncate(job: &str) -> String {
    if job.chars().count() > 40 {
        let tail: String = job.chars().rev().take(37).collect::<Vec<_>>().into_iter().rev().collect();
        format!("...{}", tail)
    } else {
        job.to_string()
    }
}
