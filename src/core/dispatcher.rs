//! Bounded worker pool that runs one external process per job
//!
//! `B` workers pull task assignments from a single FIFO queue. Each worker
//! runs its job in a spawned task and awaits the handle, so a task that
//! panics or is cancelled still yields exactly one outcome. Outcomes go
//! over a channel to the collector as they complete.
//!
//! The device hint is applied to the child's own environment only; the
//! orchestrator's environment is never touched.
//!
//! Cancelling [`DispatchOptions::cancel`] stops the pool: in-flight process
//! groups are terminated and every unfinished job is recorded as an
//! interrupted Error.

use crate::core::{InvocationCommand, Job, JobStatus, OutcomeRecord, SchedulePlan, TaskAssignment};
use crate::error::{BatchError, IoResultExt};
use crate::progress::ProgressReporter;
use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long to wait for output pipes to close after the process has gone.
/// Grandchildren that inherited the pipes can keep them open indefinitely.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Trailing stderr lines kept as a failed job's diagnostic
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Per-job stdout capture file
pub const STDOUT_LOG: &str = "stdout.log";

/// Per-job stderr capture file
pub const STDERR_LOG: &str = "stderr.log";

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Wall-clock ceiling per job, from spawn
    pub timeout: Duration,
    /// Time between SIGTERM and SIGKILL when a job is stopped
    pub kill_grace: Duration,
    /// Cancelled when the run must stop
    pub cancel: CancellationToken,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::config::DEFAULT_JOB_TIMEOUT_SECS),
            kill_grace: Duration::from_secs(10),
            cancel: CancellationToken::new(),
        }
    }
}

/// Captured process output
#[derive(Debug, Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// How the wait on a child ended
enum WaitResult {
    Exited(ExitStatus),
    TimedOut,
    Interrupted,
    Failed(std::io::Error),
}

/// Bounded-concurrency job dispatcher
pub struct Dispatcher {
    options: DispatchOptions,
    progress: Option<Arc<ProgressReporter>>,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(options: DispatchOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    /// Set progress reporter
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run every assignment in `plan` with at most `plan.concurrency`
    /// processes alive, sending each outcome on `outcomes` as it completes.
    /// Returns the number of tasks dispatched.
    pub async fn dispatch(
        &self,
        plan: SchedulePlan,
        outcomes: mpsc::UnboundedSender<OutcomeRecord>,
    ) -> usize {
        self.dispatch_with(plan, outcomes, Dispatcher::run_task).await
    }

    /// [`dispatch`](Self::dispatch) with a custom per-job runner
    async fn dispatch_with<R, F>(
        &self,
        plan: SchedulePlan,
        outcomes: mpsc::UnboundedSender<OutcomeRecord>,
        run: R,
    ) -> usize
    where
        R: Fn(TaskAssignment, DispatchOptions) -> F + Clone + Send + Sync + 'static,
        F: Future<Output = OutcomeRecord> + Send + 'static,
    {
        let total = plan.len();
        if total == 0 {
            return 0;
        }

        let workers = plan.concurrency.min(total).max(1);
        let queue = Arc::new(Mutex::new(VecDeque::from(plan.assignments)));

        tracing::info!(tasks = total, workers, timeout = ?self.options.timeout, "Dispatching jobs");

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let outcomes = outcomes.clone();
                let options = self.options.clone();
                let progress = self.progress.clone();
                let run = run.clone();
                tokio::spawn(worker_loop(worker_id, queue, outcomes, options, progress, run))
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task terminated abnormally");
            }
        }

        // Jobs left behind by a stopped pool or a dead worker.
        let interrupted = self.options.cancel.is_cancelled();
        let leftover: Vec<TaskAssignment> = queue.lock().await.drain(..).collect();
        for assignment in leftover {
            let record = if interrupted {
                OutcomeRecord::interrupted(assignment.job, "Run interrupted before the job was started", None)
            } else {
                OutcomeRecord::resolution_error(
                    assignment.job,
                    "Worker pool stopped before the job was started",
                )
            };
            if let Some(progress) = &self.progress {
                progress.job_finished(&record.job.id, record.status());
            }
            if outcomes.send(record).is_err() {
                tracing::warn!("Result collector is gone, dropping outcome");
            }
        }

        total
    }

    /// Run a single job to a terminal outcome
    pub async fn run_task(assignment: TaskAssignment, options: DispatchOptions) -> OutcomeRecord {
        let TaskAssignment { mut job, command, .. } = assignment;

        if options.cancel.is_cancelled() {
            return OutcomeRecord::interrupted(job, "Run interrupted before the job was started", None);
        }
        if let Err(e) = job.start() {
            return OutcomeRecord::resolution_error(job, e.to_string());
        }

        let device = job.device_label();
        tracing::info!(job = %job.id, device = %device, command = %command.display(), "Starting prediction");

        if let Err(e) = std::fs::create_dir_all(&command.output_dir).with_path(&command.output_dir) {
            tracing::error!(job = %job.id, error = %e, "Cannot create job output directory");
            return finish(job, JobStatus::Error, None, Some(e.to_string()), None);
        }

        let started = Instant::now();
        let mut child = match spawn(&command) {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job = %job.id, error = %e, "Failed to launch prediction");
                return finish(job, JobStatus::Error, None, Some(e.to_string()), None);
            }
        };

        let stdout = child.stdout.take().map(read_pipe);
        let stderr = child.stderr.take().map(read_pipe);

        let waited = tokio::select! {
            result = tokio::time::timeout(options.timeout, child.wait()) => match result {
                Ok(Ok(status)) => WaitResult::Exited(status),
                Ok(Err(e)) => WaitResult::Failed(e),
                Err(_) => WaitResult::TimedOut,
            },
            _ = options.cancel.cancelled() => WaitResult::Interrupted,
        };
        match waited {
            WaitResult::TimedOut => {
                tracing::warn!(job = %job.id, timeout = ?options.timeout, "Prediction timed out, terminating");
                terminate(&mut child, options.kill_grace).await;
            }
            WaitResult::Interrupted => {
                tracing::warn!(job = %job.id, "Run interrupted, terminating prediction");
                terminate(&mut child, options.kill_grace).await;
            }
            _ => {}
        }
        let duration = started.elapsed();

        let captured = Captured {
            stdout: drain_pipe(stdout).await,
            stderr: drain_pipe(stderr).await,
        };
        persist_logs(&command.output_dir, &captured);

        match waited {
            WaitResult::Exited(status) if status.success() => {
                tracing::info!(job = %job.id, device = %device, duration = ?duration, "Prediction succeeded");
                finish(job, JobStatus::Succeeded, Some(duration), None, status.code())
            }
            WaitResult::Exited(status) => {
                let diagnostic = failure_text(&captured.stderr, &status);
                tracing::error!(job = %job.id, device = %device, exit_code = ?status.code(), "Prediction failed");
                finish(
                    job,
                    JobStatus::Failed,
                    Some(duration),
                    Some(diagnostic),
                    status.code(),
                )
            }
            WaitResult::TimedOut => {
                let message = format!(
                    "Prediction timed out after {}",
                    humantime::format_duration(options.timeout)
                );
                finish(job, JobStatus::TimedOut, Some(duration), Some(message), None)
            }
            WaitResult::Interrupted => {
                OutcomeRecord::interrupted(job, "Prediction stopped by shutdown signal", Some(duration))
            }
            WaitResult::Failed(e) => {
                let err = BatchError::launch(command.program_name(), e);
                tracing::error!(job = %job.id, error = %err, "Failed waiting on prediction");
                finish(job, JobStatus::Error, Some(duration), Some(err.to_string()), None)
            }
        }
    }
}

async fn worker_loop<R, F>(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<TaskAssignment>>>,
    outcomes: mpsc::UnboundedSender<OutcomeRecord>,
    options: DispatchOptions,
    progress: Option<Arc<ProgressReporter>>,
    run: R,
) where
    R: Fn(TaskAssignment, DispatchOptions) -> F,
    F: Future<Output = OutcomeRecord> + Send + 'static,
{
    loop {
        if options.cancel.is_cancelled() {
            tracing::debug!(worker_id, "Worker stopping on cancellation");
            break;
        }
        let next = queue.lock().await.pop_front();
        let Some(assignment) = next else { break };

        let pending = assignment.job.clone();
        if let Some(progress) = &progress {
            progress.job_started(&pending.id);
        }
        tracing::debug!(worker_id, job = %pending.id, "Worker picked up job");

        let handle = tokio::spawn(run(assignment, options.clone()));
        let record = match handle.await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(worker_id, job = %pending.id, error = %e, "Job task could not be resolved");
                OutcomeRecord::resolution_error(pending, format!("Task join error: {}", e))
            }
        };

        if let Some(progress) = &progress {
            progress.job_finished(&record.job.id, record.status());
        }
        if outcomes.send(record).is_err() {
            tracing::warn!(worker_id, "Result collector is gone, dropping outcome");
        }
    }
}

fn finish(
    mut job: Job,
    status: JobStatus,
    duration: Option<Duration>,
    error: Option<String>,
    exit_code: Option<i32>,
) -> OutcomeRecord {
    match job.finish(status, duration, error) {
        Ok(()) => OutcomeRecord::new(job, exit_code),
        Err(e) => OutcomeRecord::resolution_error(job, e.to_string()),
    }
}

/// Spawn the child with a task-local environment override
fn spawn(command: &InvocationCommand) -> Result<Child, BatchError> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match command.device_hint() {
        Some(hint) => {
            cmd.env(&command.device_env_var, hint);
        }
        None => {
            cmd.env_remove(&command.device_env_var);
        }
    }

    // Own process group so a timeout can take down the tool's helpers too.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
        .map_err(|e| BatchError::launch(command.program_name(), e))
}

fn read_pipe<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "Output pipe read ended with error");
        }
        buf
    })
}

async fn drain_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Output reader task failed");
            Vec::new()
        }
        Err(_) => {
            handle.abort();
            tracing::debug!("Output pipe still open after process exit, giving up");
            Vec::new()
        }
    }
}

/// SIGTERM the process group, wait out the grace period, then SIGKILL.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let group = Pid::from_raw(pid as i32);
        if let Err(e) = killpg(group, Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "SIGTERM to process group failed");
        }
        if !grace.is_zero() && tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        let _ = killpg(group, Signal::SIGKILL);
    }

    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill stopped process");
    }
}

fn persist_logs(dir: &Path, captured: &Captured) {
    for (name, bytes) in [(STDOUT_LOG, &captured.stdout), (STDERR_LOG, &captured.stderr)] {
        let path = dir.join(name);
        if let Err(e) = std::fs::write(&path, bytes) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write job log");
        }
    }
}

/// Last [`DIAGNOSTIC_TAIL_LINES`] lines of stderr, or the exit status when
/// stderr is empty. The full text stays in the job's stderr log.
fn failure_text(stderr: &[u8], status: &ExitStatus) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.trim().lines().collect();
    if lines.is_empty() {
        return match status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
    }

    let skipped = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    let tail = lines[skipped..].join("\n");
    if skipped == 0 {
        tail
    } else {
        format!("... {} earlier line(s) in {}\n{}", skipped, STDERR_LOG, tail)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::{DevicePool, ErrorOrigin, InvocationTemplate, ResultCollector, Scheduler};
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Fake prediction tool, run through `sh` so it never needs exec bits
    fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("predict.sh");
        std::fs::write(&path, format!("{}\n", body)).unwrap();
        path
    }

    fn template(executable: PathBuf, out: &Path) -> InvocationTemplate {
        InvocationTemplate {
            executable,
            interpreter: Some("sh".to_string()),
            template_date: "3000-12-01".to_string(),
            output_root: out.to_path_buf(),
            device_env_var: "FOLDBATCH_TEST_DEVICE".to_string(),
        }
    }

    fn options(timeout_ms: u64) -> DispatchOptions {
        DispatchOptions {
            timeout: Duration::from_millis(timeout_ms),
            kill_grace: Duration::from_millis(200),
            ..Default::default()
        }
    }

    fn assignment(t: &InvocationTemplate, name: &str, device: Option<u32>) -> TaskAssignment {
        let mut job = Job::new(format!("/in/{}.json", name));
        job.device = device;
        let command = t.render(&job, device);
        TaskAssignment {
            index: 0,
            job,
            command,
        }
    }

    #[tokio::test]
    async fn test_success_and_device_hint() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), r#"echo "device=${FOLDBATCH_TEST_DEVICE:-none}"; exit 0"#);
        let t = template(tool, &dir.path().join("out"));

        let record = Dispatcher::run_task(assignment(&t, "alpha", Some(1)), options(10_000)).await;

        assert_eq!(record.status(), JobStatus::Succeeded);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.job.duration.is_some());
        let log = std::fs::read_to_string(dir.path().join("out/alpha").join(STDOUT_LOG)).unwrap();
        assert_eq!(log.trim(), "device=1");
    }

    #[tokio::test]
    async fn test_cpu_mode_removes_device_variable() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), r#"echo "device=${FOLDBATCH_TEST_DEVICE:-none}""#);
        let t = template(tool, &dir.path().join("out"));

        let record = Dispatcher::run_task(assignment(&t, "beta", None), options(10_000)).await;

        assert_eq!(record.status(), JobStatus::Succeeded);
        let log = std::fs::read_to_string(dir.path().join("out/beta").join(STDOUT_LOG)).unwrap();
        assert_eq!(log.trim(), "device=none");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "echo 'invalid chain id' >&2; exit 2");
        let t = template(tool, &dir.path().join("out"));

        let record = Dispatcher::run_task(assignment(&t, "gamma", None), options(10_000)).await;

        assert_eq!(record.status(), JobStatus::Failed);
        assert_eq!(record.exit_code, Some(2));
        assert_eq!(record.job.error.as_deref(), Some("invalid chain id"));
        assert!(record.job.duration.is_some());
    }

    #[tokio::test]
    async fn test_silent_failure_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "exit 3");
        let t = template(tool, &dir.path().join("out"));

        let record = Dispatcher::run_task(assignment(&t, "delta", None), options(10_000)).await;

        assert_eq!(record.status(), JobStatus::Failed);
        assert_eq!(record.job.error.as_deref(), Some("exit code 3"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let tool = fake_tool(dir.path(), &format!("sleep 5; touch {}", marker.display()));
        let t = template(tool, &dir.path().join("out"));

        let started = Instant::now();
        let record = Dispatcher::run_task(assignment(&t, "slow", None), options(300)).await;

        assert_eq!(record.status(), JobStatus::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(4));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let dir = TempDir::new().unwrap();
        let mut t = template(dir.path().join("does-not-exist"), &dir.path().join("out"));
        t.interpreter = None;

        let record = Dispatcher::run_task(assignment(&t, "eps", None), options(10_000)).await;

        assert_eq!(record.status(), JobStatus::Error);
        assert_eq!(record.origin, Some(ErrorOrigin::Launch));
        assert!(record.job.error.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_emits_one_outcome_per_task() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(
            dir.path(),
            r#"case "$2" in *bad*) exit 1;; esac; exit 0"#,
        );
        let t = template(tool, &dir.path().join("out"));
        let jobs = ["a", "bad1", "c", "bad2", "e"]
            .iter()
            .map(|n| Job::new(format!("/in/{}.json", n)))
            .collect();
        let plan = Scheduler::new(DevicePool::with_count(2), 4, 8).plan(jobs, &t);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatched = Dispatcher::new(options(10_000)).dispatch(plan, tx).await;

        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }

        assert_eq!(dispatched, 5);
        assert_eq!(records.len(), 5);
        let failed = records.iter().filter(|r| r.status() == JobStatus::Failed).count();
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn test_long_stderr_keeps_tail() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "for i in $(seq 1 100); do echo \"line $i\" >&2; done; exit 1");
        let t = template(tool, &dir.path().join("out"));

        let record = Dispatcher::run_task(assignment(&t, "noisy", None), options(10_000)).await;

        assert_eq!(record.status(), JobStatus::Failed);
        let diagnostic = record.job.error.unwrap();
        assert!(diagnostic.ends_with("line 100"));
        assert!(diagnostic.lines().count() <= DIAGNOSTIC_TAIL_LINES + 1);
        assert!(diagnostic.starts_with("... 80 earlier line(s) in stderr.log"));
        assert!(!diagnostic.contains("line 80\n"));

        let full = std::fs::read_to_string(dir.path().join("out/noisy").join(STDERR_LOG)).unwrap();
        assert_eq!(full.lines().count(), 100);
    }

    #[tokio::test]
    async fn test_cancel_terminates_running_job() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let tool = fake_tool(dir.path(), &format!("sleep 5; touch {}", marker.display()));
        let t = template(tool, &dir.path().join("out"));

        let opts = options(60_000);
        let cancel = opts.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let record = Dispatcher::run_task(assignment(&t, "stopped", None), opts).await;

        assert_eq!(record.status(), JobStatus::Error);
        assert_eq!(record.origin, Some(ErrorOrigin::Interrupted));
        assert!(record.job.duration.is_some());
        assert!(started.elapsed() < Duration::from_secs(4));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_cancel_records_queued_jobs_as_interrupted() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "sleep 5");
        let t = template(tool, &dir.path().join("out"));
        let jobs = ["a", "b", "c", "d"]
            .iter()
            .map(|n| Job::new(format!("/in/{}.json", n)))
            .collect();
        let plan = Scheduler::new(DevicePool::cpu_only(), 1, 8).plan(jobs, &t);

        let opts = options(60_000);
        let cancel = opts.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let dispatcher = Dispatcher::new(opts);
        let (dispatched, summary) = tokio::join!(
            dispatcher.dispatch(plan, tx),
            ResultCollector::new(Vec::new()).collect(rx)
        );

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(dispatched, 4);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.interrupted(), 4);
        assert_eq!(summary.bucket(JobStatus::Error).len(), 4);
    }

    #[tokio::test]
    async fn test_dispatch_survives_dropped_collector() {
        let dir = TempDir::new().unwrap();
        let t = template(dir.path().join("unused.sh"), &dir.path().join("out"));
        let jobs = ["a", "b", "c"].iter().map(|n| Job::new(format!("/in/{}.json", n))).collect();
        let plan = Scheduler::new(DevicePool::with_count(1), 1, 8).plan(jobs, &t);

        // Cancelled up front: every job goes through the leftover path.
        let opts = options(10_000);
        opts.cancel.cancel();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let dispatched = Dispatcher::new(opts)
            .dispatch_with(plan, tx, |assignment: TaskAssignment, _options: DispatchOptions| async move {
                OutcomeRecord::resolution_error(assignment.job, "runner should not be called")
            })
            .await;

        assert_eq!(dispatched, 3);
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_resolution_error() {
        let dir = TempDir::new().unwrap();
        let t = template(dir.path().join("unused.sh"), &dir.path().join("out"));
        let names = ["ok1", "boom1", "ok2", "ok3", "boom2", "ok4", "ok5"];
        let jobs = names.iter().map(|n| Job::new(format!("/in/{}.json", n))).collect();
        let plan = Scheduler::new(DevicePool::with_count(3), 3, 8).plan(jobs, &t);

        let run = |assignment: TaskAssignment, _options: DispatchOptions| async move {
            let mut job = assignment.job;
            if job.id.starts_with("boom") {
                panic!("prediction task blew up");
            }
            job.start().unwrap();
            job.finish(JobStatus::Succeeded, Some(Duration::from_millis(1)), None)
                .unwrap();
            OutcomeRecord::new(job, Some(0))
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(options(10_000));
        let (dispatched, summary) = tokio::join!(
            dispatcher.dispatch_with(plan, tx, run),
            ResultCollector::new(Vec::new()).collect(rx)
        );

        assert_eq!(dispatched, names.len());
        assert_eq!(summary.resolution_errors(), 2);
        assert_eq!(summary.bucket(JobStatus::Succeeded).len(), 5);
        let accounted = summary.bucket(JobStatus::Succeeded).len()
            + summary.bucket(JobStatus::Failed).len()
            + summary.bucket(JobStatus::TimedOut).len()
            + summary.bucket(JobStatus::Error).len();
        assert_eq!(accounted, dispatched);
        assert!(summary
            .bucket(JobStatus::Error)
            .iter()
            .all(|r| r.job.id.starts_with("boom") && r.origin == Some(ErrorOrigin::Resolution)));
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_device_count() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("activity.log");
        let tool = fake_tool(
            dir.path(),
            &format!(
                "echo start >> {log}; sleep 0.3; echo end >> {log}",
                log = log.display()
            ),
        );
        let t = template(tool, &dir.path().join("out"));
        let jobs = (0..9).map(|i| Job::new(format!("/in/job{}.json", i))).collect();
        // Four requested, two devices: two processes at most.
        let plan = Scheduler::new(DevicePool::with_count(2), 4, 8).plan(jobs, &t);
        assert_eq!(plan.concurrency, 2);

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(options(10_000));
        let (dispatched, summary) = tokio::join!(
            dispatcher.dispatch(plan, tx),
            ResultCollector::new(Vec::new()).collect(rx)
        );
        assert_eq!(dispatched, 9);
        assert_eq!(summary.bucket(JobStatus::Succeeded).len(), 9);

        let mut live = 0i32;
        let mut peak = 0i32;
        for line in std::fs::read_to_string(&log).unwrap().lines() {
            match line {
                "start" => live += 1,
                "end" => live -= 1,
                other => panic!("unexpected log line {:?}", other),
            }
            peak = peak.max(live);
        }
        assert_eq!(live, 0);
        assert!(peak >= 1 && peak <= 2, "peak in-flight was {}", peak);
    }
}
