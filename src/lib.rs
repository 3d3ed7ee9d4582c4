//! # FoldBatch - Batch Dispatch for Structure Prediction
//!
//! FoldBatch runs one external prediction process (AlphaFold3's
//! `run_alphafold.py` by default) per job descriptor in an input directory,
//! spreading jobs round-robin over the detected GPUs or running them on CPU
//! when none are present.
//!
//! ## Features
//!
//! - **Descriptor Intake**: Glob-selected, validated, sorted job list
//! - **Round-Robin Devices**: Job `i` gets device `i mod D`, passed as an
//!   environment hint to that child only
//! - **Bounded Concurrency**: `min(max_concurrent, D)` workers, or
//!   `min(max_concurrent, cpus)` in CPU mode
//! - **Timeouts**: Per-job wall-clock ceiling with process-group termination
//! - **Graceful Shutdown**: SIGINT/SIGTERM stop running jobs and still
//!   produce the report
//! - **Outcome Accounting**: Succeeded / Failed / TimedOut / Error buckets,
//!   plus skipped descriptors
//! - **Reports**: Text or JSON summary at the output root
//!
//! ## Quick Start
//!
//! ```no_run
//! use foldbatch::config::BatchConfig;
//! use foldbatch::core::BatchRunner;
//! use std::path::PathBuf;
//!
//! # async fn example() -> foldbatch::Result<()> {
//! let config = BatchConfig {
//!     input_dir: PathBuf::from("/data/inputs"),
//!     output_dir: PathBuf::from("/data/results"),
//!     max_concurrent: 4,
//!     ..Default::default()
//! };
//!
//! let outcome = BatchRunner::new(config).run().await?;
//! outcome.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Planning Without Running
//!
//! ```no_run
//! use foldbatch::config::BatchConfig;
//! use foldbatch::core::{BatchRunner, DevicePool};
//!
//! let runner = BatchRunner::new(BatchConfig::default()).with_pool(DevicePool::with_count(2));
//! let prepared = runner.prepare().unwrap();
//! for (job, device) in prepared.plan.mapping() {
//!     println!("{} -> {:?}", job, device);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod intake;
pub mod progress;
pub mod report;
pub mod shutdown;
pub mod system;

// Re-export commonly used types
pub use crate::config::{BatchConfig, ReportFormat};
pub use crate::core::{BatchOutcome, BatchRunner, BatchSummary, Job, JobStatus};
pub use crate::error::{BatchError, Result};
pub use crate::progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
