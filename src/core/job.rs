//! Job model and outcome records
//!
//! A [`Job`] is created at intake, moved through its lifecycle only by the
//! dispatcher, and frozen once it reaches a terminal state. The frozen job
//! travels to the collector inside an [`OutcomeRecord`].

use crate::error::{BatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Validated and waiting for a worker
    Pending,
    /// External process in flight
    Running,
    /// Process exited with code 0
    Succeeded,
    /// Process exited non-zero
    Failed,
    /// Process exceeded the wall-clock ceiling and was terminated
    TimedOut,
    /// Process could not be launched, waited on, or resolved
    Error,
}

impl JobStatus {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Error
        )
    }

    /// Pending → Running → terminal. Error may also be reached from Pending
    /// when the worker's task dies before the job starts.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending, Self::Error) => true,
            (Self::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Section title used in reports
    pub fn title(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::TimedOut => "Timed out",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Human-readable designation of an advisory device slot
pub fn device_label(device: Option<u32>) -> String {
    match device {
        Some(id) => format!("GPU {}", id),
        None => "CPU".to_string(),
    }
}

/// One unit of batch work: a single prediction over a single descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Identifier derived from the descriptor file stem
    pub id: String,
    /// Descriptor path
    pub input: PathBuf,
    /// Advisory device, None in CPU mode
    pub device: Option<u32>,
    status: JobStatus,
    /// Wall-clock start
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock end
    pub finished_at: Option<DateTime<Utc>>,
    /// Measured run time
    pub duration: Option<Duration>,
    /// Captured diagnostic text
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job for a descriptor
    pub fn new(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        Self {
            id: job_id_for(&input),
            input,
            device: None,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            duration: None,
            error: None,
        }
    }

    /// Current status
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Designation for logs and reports
    pub fn device_label(&self) -> String {
        device_label(self.device)
    }

    /// Move to `next`, rejecting any non-monotonic transition
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BatchError::InvalidTransition {
                job: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Pending → Running, stamping the start time
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Move to a terminal status and record the end of the run
    pub fn finish(
        &mut self,
        status: JobStatus,
        duration: Option<Duration>,
        error: Option<String>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(BatchError::InvalidTransition {
                job: self.id.clone(),
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;
        self.finished_at = Some(Utc::now());
        self.duration = duration;
        self.error = error;
        Ok(())
    }
}

/// Job identifier for a descriptor path: the file name without extension
pub fn job_id_for(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Where an Error outcome came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// Spawning or waiting on the process failed
    Launch,
    /// The task running the job could not be joined
    Resolution,
    /// The run received a shutdown signal before the job finished
    Interrupted,
}

impl std::fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launch => write!(f, "launch"),
            Self::Resolution => write!(f, "resolution"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Terminal classification of a job plus its diagnostic payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// The job, frozen in a terminal state
    pub job: Job,
    /// Process exit code, when the process exited on its own
    pub exit_code: Option<i32>,
    /// Set for Error outcomes
    pub origin: Option<ErrorOrigin>,
}

impl OutcomeRecord {
    /// Wrap a terminal job
    pub fn new(job: Job, exit_code: Option<i32>) -> Self {
        let origin = (job.status() == JobStatus::Error).then_some(ErrorOrigin::Launch);
        Self {
            job,
            exit_code,
            origin,
        }
    }

    /// Error outcome for a job whose task could not be joined
    pub fn resolution_error(job: Job, message: impl Into<String>) -> Self {
        Self::forced_error(job, message.into(), None, ErrorOrigin::Resolution)
    }

    /// Error outcome for a job stopped, or never started, because of a
    /// shutdown signal
    pub fn interrupted(job: Job, message: impl Into<String>, duration: Option<Duration>) -> Self {
        Self::forced_error(job, message.into(), duration, ErrorOrigin::Interrupted)
    }

    fn forced_error(mut job: Job, message: String, duration: Option<Duration>, origin: ErrorOrigin) -> Self {
        // A job that never left Pending goes straight to Error; one that was
        // Running is terminated normally.
        if job.finish(JobStatus::Error, duration, Some(message.clone())).is_err() {
            job.status = JobStatus::Error;
            job.error = Some(message);
            job.duration = duration;
            job.finished_at = Some(Utc::now());
        }
        Self {
            job,
            exit_code: None,
            origin: Some(origin),
        }
    }

    /// Terminal status
    pub fn status(&self) -> JobStatus {
        self.job.status()
    }
}
