//! Result collection
//!
//! A single collector owns the outcome buckets and drains the dispatcher's
//! channel, so records land in completion order without any shared map.

use crate::core::{ErrorOrigin, JobStatus, OutcomeRecord};
use crate::intake::SkippedCandidate;
use serde::Serialize;
use tokio::sync::mpsc;

/// Terminal outcomes of a batch plus the candidates that never ran
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Exit code 0
    pub succeeded: Vec<OutcomeRecord>,
    /// Non-zero exit
    pub failed: Vec<OutcomeRecord>,
    /// Killed at the timeout ceiling
    pub timed_out: Vec<OutcomeRecord>,
    /// Launch or resolution errors
    pub errors: Vec<OutcomeRecord>,
    /// Rejected before scheduling
    pub skipped: Vec<SkippedCandidate>,
}

impl BatchSummary {
    /// Empty summary carrying the rejected candidates
    pub fn with_skipped(skipped: Vec<SkippedCandidate>) -> Self {
        Self {
            skipped,
            ..Default::default()
        }
    }

    /// Append a record to its bucket
    pub fn record(&mut self, record: OutcomeRecord) {
        match record.status() {
            JobStatus::Succeeded => self.succeeded.push(record),
            JobStatus::Failed => self.failed.push(record),
            JobStatus::TimedOut => self.timed_out.push(record),
            JobStatus::Error => self.errors.push(record),
            status @ (JobStatus::Pending | JobStatus::Running) => {
                // Non-terminal records are a dispatcher bug; keep them
                // accounted for rather than losing the job.
                tracing::error!(job = %record.job.id, %status, "Non-terminal outcome received");
                let id = record.job.id.clone();
                self.errors.push(OutcomeRecord::resolution_error(
                    record.job,
                    format!("Job '{}' reported non-terminal status {}", id, status),
                ));
            }
        }
    }

    /// Records in `status`'s bucket
    pub fn bucket(&self, status: JobStatus) -> &[OutcomeRecord] {
        match status {
            JobStatus::Succeeded => &self.succeeded,
            JobStatus::Failed => &self.failed,
            JobStatus::TimedOut => &self.timed_out,
            JobStatus::Error => &self.errors,
            JobStatus::Pending | JobStatus::Running => &[],
        }
    }

    /// Number of dispatched jobs accounted for
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.timed_out.len() + self.errors.len()
    }

    /// Candidates seen at intake, dispatched or not
    pub fn total_candidates(&self) -> usize {
        self.total() + self.skipped.len()
    }

    fn errors_from(&self, origin: ErrorOrigin) -> usize {
        self.errors.iter().filter(|r| r.origin == Some(origin)).count()
    }

    /// Error outcomes produced because a task could not be joined
    pub fn resolution_errors(&self) -> usize {
        self.errors_from(ErrorOrigin::Resolution)
    }

    /// Error outcomes raised while spawning or waiting on a process
    pub fn launch_errors(&self) -> usize {
        self.errors_from(ErrorOrigin::Launch)
    }

    /// Error outcomes caused by a shutdown signal
    pub fn interrupted(&self) -> usize {
        self.errors_from(ErrorOrigin::Interrupted)
    }

    /// Succeeded / total × 100, or None when nothing was dispatched
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            None
        } else {
            Some(self.succeeded.len() as f64 / total as f64 * 100.0)
        }
    }
}

/// Drains outcome records into a [`BatchSummary`]
#[derive(Debug, Default)]
pub struct ResultCollector {
    summary: BatchSummary,
}

impl ResultCollector {
    /// Create a collector seeded with the rejected candidates
    pub fn new(skipped: Vec<SkippedCandidate>) -> Self {
        Self {
            summary: BatchSummary::with_skipped(skipped),
        }
    }

    /// Consume records until every sender is dropped
    pub async fn collect(mut self, mut outcomes: mpsc::UnboundedReceiver<OutcomeRecord>) -> BatchSummary {
        while let Some(record) = outcomes.recv().await {
            tracing::debug!(
                job = %record.job.id,
                status = %record.status(),
                completed = self.summary.total() + 1,
                "Outcome recorded"
            );
            self.summary.record(record);
        }
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Job;
    use std::path::PathBuf;
    use std::time::Duration;

    fn outcome(name: &str, status: JobStatus) -> OutcomeRecord {
        let mut job = Job::new(format!("/in/{}.json", name));
        job.start().unwrap();
        job.finish(status, Some(Duration::from_secs(1)), None).unwrap();
        OutcomeRecord::new(job, None)
    }

    #[test]
    fn test_bucketing() {
        let mut summary = BatchSummary::default();
        summary.record(outcome("a", JobStatus::Succeeded));
        summary.record(outcome("b", JobStatus::Failed));
        summary.record(outcome("c", JobStatus::TimedOut));
        summary.record(outcome("d", JobStatus::Error));
        summary.record(OutcomeRecord::resolution_error(Job::new("e.json"), "panicked"));
        summary.record(OutcomeRecord::interrupted(Job::new("f.json"), "signal", None));

        assert_eq!(summary.succeeded.len(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.timed_out.len(), 1);
        assert_eq!(summary.errors.len(), 3);
        assert_eq!(summary.resolution_errors(), 1);
        assert_eq!(summary.launch_errors(), 1);
        assert_eq!(summary.interrupted(), 1);
        assert_eq!(summary.total(), 6);
        assert!((summary.success_rate().unwrap() - 100.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_has_no_rate() {
        let summary = BatchSummary::default();
        assert_eq!(summary.total(), 0);
        assert!(summary.success_rate().is_none());
    }

    #[test]
    fn test_non_terminal_is_kept_as_error() {
        let mut summary = BatchSummary::default();
        let mut job = Job::new("stuck.json");
        job.start().unwrap();
        summary.record(OutcomeRecord {
            job,
            exit_code: None,
            origin: None,
        });

        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.resolution_errors(), 1);
    }

    #[tokio::test]
    async fn test_collect_in_completion_order() {
        let skipped = vec![SkippedCandidate::new(PathBuf::from("/in/bad.json"), "missing sequences")];
        let (tx, rx) = mpsc::unbounded_channel();

        for name in ["z", "m", "a"] {
            tx.send(outcome(name, JobStatus::Succeeded)).unwrap();
        }
        drop(tx);

        let summary = ResultCollector::new(skipped).collect(rx).await;

        let order: Vec<_> = summary.succeeded.iter().map(|r| r.job.id.as_str()).collect();
        assert_eq!(order, vec!["z", "m", "a"]);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.total_candidates(), 4);
    }
}
