//! Batch orchestration
//!
//! Ties the pipeline together: precondition checks, descriptor intake,
//! device detection, scheduling, dispatch with concurrent collection, and
//! the summary report. Any failure before dispatch aborts the run with no
//! report; once dispatch has begun, the report is always written, including
//! when the run is interrupted by a shutdown signal.

use crate::config::BatchConfig;
use crate::core::{
    BatchSummary, DevicePool, DispatchOptions, Dispatcher, InvocationTemplate, ResultCollector,
    SchedulePlan, Scheduler,
};
use crate::error::{BatchError, Result};
use crate::intake::{self, AcceptAll, DescriptorScanner, DescriptorValidator, JobValidator, SkippedCandidate};
use crate::progress::ProgressReporter;
use crate::report::SummaryReport;
use crate::system::{cpu_count, DeviceDetector, HostResources};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything decided before the first process is spawned
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    /// Device and command per job
    pub plan: SchedulePlan,
    /// Descriptors rejected at intake
    pub skipped: Vec<SkippedCandidate>,
    /// Host snapshot taken while planning
    pub host: HostResources,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Per-status outcomes
    pub summary: BatchSummary,
    /// Where the report was written
    pub report_path: PathBuf,
    /// Timestamp embedded in the report
    pub generated_at: DateTime<Utc>,
    /// Wall-clock time of the whole run
    pub elapsed: Duration,
    /// Worker pool size used
    pub concurrency: usize,
    /// Number of devices jobs were spread over
    pub devices: usize,
    /// Whether a shutdown signal stopped the run early
    pub interrupted: bool,
}

impl BatchOutcome {
    /// Print a short summary to the console
    pub fn print_summary(&self) {
        use console::style;

        let s = &self.summary;
        let report = SummaryReport::new(s, PathBuf::new(), self.generated_at);

        println!("\n=== Batch Summary ===");
        println!("Total jobs:     {}", s.total());
        println!("Succeeded:      {}", style(s.succeeded.len()).green());
        println!("Failed:         {}", style(s.failed.len()).red());
        println!("Timed out:      {}", style(s.timed_out.len()).yellow());
        println!("Errors:         {}", style(s.errors.len()).red());
        if !s.skipped.is_empty() {
            println!("Skipped:        {}", s.skipped.len());
        }
        println!("Success rate:   {}", report.success_rate_text());
        println!(
            "Mode:           {} (concurrency {})",
            if self.devices == 0 {
                "CPU".to_string()
            } else {
                format!("{} GPU(s)", self.devices)
            },
            self.concurrency
        );
        println!(
            "Duration:       {}",
            humantime::format_duration(Duration::from_secs(self.elapsed.as_secs()))
        );
        println!("Report:         {}", self.report_path.display());
        if self.interrupted {
            println!(
                "{}",
                style(format!("Interrupted:    {} job(s) stopped or never started", s.interrupted())).yellow()
            );
        }
    }
}

/// Runs one batch from a validated configuration
pub struct BatchRunner {
    config: BatchConfig,
    pool: Option<DevicePool>,
    cpu_count: usize,
    cancel: CancellationToken,
}

impl BatchRunner {
    /// Create a runner
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            pool: None,
            cpu_count: cpu_count(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use a fixed device pool instead of querying the host
    pub fn with_pool(mut self, pool: DevicePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Stop the run when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fatal checks, in order: executable, input directory, output root
    pub fn check_preconditions(&self) -> Result<()> {
        let config = &self.config;

        if !config.executable.exists() {
            return Err(BatchError::ExecutableNotFound(config.executable.clone()));
        }
        if !config.input_dir.is_dir() {
            return Err(BatchError::InputDirNotFound(config.input_dir.clone()));
        }
        std::fs::create_dir_all(&config.output_dir).map_err(|source| BatchError::OutputDirUnavailable {
            path: config.output_dir.clone(),
            source,
        })?;
        Ok(())
    }

    /// Check preconditions, collect jobs, detect devices and plan
    pub fn prepare(&self) -> Result<PreparedBatch> {
        self.check_preconditions()?;

        let scanner = DescriptorScanner::new(&self.config.pattern)?;
        let validator: Box<dyn JobValidator> = if self.config.validate {
            Box::new(DescriptorValidator)
        } else {
            Box::new(AcceptAll)
        };
        let intake = intake::collect_jobs(&self.config.input_dir, &scanner, validator.as_ref())?;

        let pool = match &self.pool {
            Some(pool) => pool.clone(),
            None => DeviceDetector::new(self.config.device_query.clone()).pool(self.config.device_override),
        };

        let host = HostResources::with_accelerators(pool.len());
        host.log();

        let scheduler = Scheduler::new(pool, self.config.max_concurrent, self.cpu_count);
        let template = InvocationTemplate::from_config(&self.config);
        let plan = scheduler.plan(intake.jobs, &template);

        for assignment in &plan.assignments {
            tracing::debug!(
                job = %assignment.job.id,
                device = %assignment.job.device_label(),
                "Job assigned"
            );
        }

        Ok(PreparedBatch {
            plan,
            skipped: intake.skipped,
            host,
        })
    }

    /// Run the whole batch and write the report
    pub async fn run(&self) -> Result<BatchOutcome> {
        let started = Instant::now();
        let prepared = self.prepare()?;
        self.execute(prepared, started).await
    }

    /// Dispatch a prepared batch, collecting outcomes as they complete
    pub async fn execute(&self, prepared: PreparedBatch, started: Instant) -> Result<BatchOutcome> {
        let PreparedBatch { plan, skipped, .. } = prepared;
        let concurrency = plan.concurrency;
        let devices = plan.pool.len();

        let progress = Arc::new(if self.config.progress {
            ProgressReporter::new(plan.len() as u64)
        } else {
            ProgressReporter::disabled()
        });

        let dispatcher = Dispatcher::new(DispatchOptions {
            timeout: self.config.job_timeout,
            kill_grace: self.config.kill_grace,
            cancel: self.cancel.clone(),
        })
        .with_progress(Arc::clone(&progress));

        let (tx, rx) = mpsc::unbounded_channel();
        let collector = ResultCollector::new(skipped);
        let (dispatched, summary) = tokio::join!(dispatcher.dispatch(plan, tx), collector.collect(rx));

        if summary.total() != dispatched {
            tracing::error!(
                dispatched,
                accounted = summary.total(),
                "Outcome count does not match dispatched tasks"
            );
        }
        let interrupted = self.cancel.is_cancelled();
        if interrupted {
            progress.finish_error("interrupted");
        } else {
            progress.finish();
        }

        let generated_at = Utc::now();
        let report_path = self.config.report_path();
        SummaryReport::new(&summary, &self.config.output_dir, generated_at)
            .write(&report_path, self.config.report_format)?;

        let elapsed = started.elapsed();
        tracing::info!(
            total = summary.total(),
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            timed_out = summary.timed_out.len(),
            errors = summary.errors.len(),
            skipped = summary.skipped.len(),
            interrupted = summary.interrupted(),
            elapsed = ?elapsed,
            "Batch complete"
        );

        Ok(BatchOutcome {
            summary,
            report_path,
            generated_at,
            elapsed,
            concurrency,
            devices,
            interrupted,
        })
    }
}
