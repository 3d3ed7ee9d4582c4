//! Error types for FoldBatch
//!
//! Orchestration-level errors only. Per-job failures (non-zero exit,
//! timeout, launch failure) are recorded as outcomes and never surface
//! through this type.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::JobStatus;

/// Main error type for FoldBatch operations
#[derive(Error, Debug)]
pub enum BatchError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Input directory does not exist or is not a directory
    #[error("Input directory not found: {0}")]
    InputDirNotFound(PathBuf),

    /// Prediction executable does not exist
    #[error("Prediction executable not found: {0}")]
    ExecutableNotFound(PathBuf),

    /// Output root could not be created
    #[error("Cannot create output directory '{path}': {source}")]
    OutputDirUnavailable {
        /// Output root
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Report serialization or writing error
    #[error("Report error: {0}")]
    ReportError(String),

    /// A job was asked to move backwards or out of a terminal state
    #[error("Job '{job}' cannot transition from {from} to {to}")]
    InvalidTransition {
        /// Job identifier
        job: String,
        /// Current status
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },

    /// The external process could not be spawned or waited on
    #[error("Failed to launch '{program}': {message}")]
    LaunchError {
        /// Program being launched
        program: String,
        /// Error text
        message: String,
    },
}

impl BatchError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a launch error
    pub fn launch(program: impl Into<String>, message: impl ToString) -> Self {
        Self::LaunchError {
            program: program.into(),
            message: message.to_string(),
        }
    }

    /// True for errors that must abort the run before any job is dispatched
    pub fn is_fatal_precondition(&self) -> bool {
        matches!(
            self,
            Self::InputDirNotFound(_)
                | Self::ExecutableNotFound(_)
                | Self::OutputDirUnavailable { .. }
                | Self::ConfigError(_)
        )
    }
}

/// Result type alias for FoldBatch operations
pub type Result<T> = std::result::Result<T, BatchError>;

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::ReportError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| BatchError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = BatchError::io("/test/path", io_err);
        assert!(matches!(&err, BatchError::Io { path, .. } if path == &PathBuf::from("/test/path")));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_fatal_preconditions() {
        assert!(BatchError::InputDirNotFound(PathBuf::from("/in")).is_fatal_precondition());
        assert!(BatchError::ExecutableNotFound(PathBuf::from("/bin/x")).is_fatal_precondition());
        assert!(BatchError::config("max-concurrent must be at least 1").is_fatal_precondition());

        let launch = BatchError::launch("run_alphafold.py", "permission denied");
        assert!(!launch.is_fatal_precondition());
        assert!(launch.to_string().contains("permission denied"));
    }

    #[test]
    fn test_with_path() {
        let res: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"));
        let err = res.with_path("/out/job1").unwrap_err();
        assert!(err.to_string().contains("/out/job1"));
    }
}
