//! Job intake
//!
//! Finds descriptor files in the input directory, runs them past a
//! [`JobValidator`], and turns the accepted ones into pending jobs in a
//! stable, sorted order. Rejected files are kept as [`SkippedCandidate`]s
//! and never enter the job lifecycle.

mod scanner;
mod validator;

pub use scanner::*;
pub use validator::*;

use crate::core::Job;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A descriptor rejected at intake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    /// Descriptor path
    pub path: PathBuf,
    /// Why it was rejected
    pub reason: String,
}

impl SkippedCandidate {
    /// Create a skipped entry
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Accepted jobs and rejected candidates
#[derive(Debug, Default)]
pub struct IntakeResult {
    /// Pending jobs, sorted by descriptor file name
    pub jobs: Vec<Job>,
    /// Rejected descriptors
    pub skipped: Vec<SkippedCandidate>,
}

impl IntakeResult {
    /// Number of descriptors seen
    pub fn candidates(&self) -> usize {
        self.jobs.len() + self.skipped.len()
    }
}

/// Scan `input_dir` and validate every candidate
pub fn collect_jobs(
    input_dir: &Path,
    scanner: &DescriptorScanner,
    validator: &dyn JobValidator,
) -> Result<IntakeResult> {
    let candidates = scanner.scan(input_dir)?;
    let mut result = IntakeResult::default();

    for path in candidates {
        match validator.validate(&path) {
            Verdict::Valid => result.jobs.push(Job::new(path)),
            Verdict::Invalid(reason) => {
                tracing::warn!(path = %path.display(), reason = %reason, "Skipping invalid descriptor");
                result.skipped.push(SkippedCandidate::new(path, reason));
            }
        }
    }

    tracing::info!(
        valid = result.jobs.len(),
        skipped = result.skipped.len(),
        "Descriptor intake complete"
    );
    Ok(result)
}
