//! Static device assignment and concurrency planning
//!
//! Jobs are bound to devices round-robin by their position in the sorted,
//! validated job list, and the worker pool size is derived once from the
//! configured ceiling and the detected resources. The plan is computed
//! before dispatch and never rebalanced: a slow job holding device 0 does
//! not move later device-0 jobs elsewhere. Device ids are advisory hints
//! passed to the child process; nothing here reserves a device.

use crate::config::BatchConfig;
use crate::core::Job;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

/// Ordered set of accelerator ids. Empty means CPU-only mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePool {
    devices: Vec<u32>,
}

impl DevicePool {
    /// Pool of `count` devices numbered from 0
    pub fn with_count(count: usize) -> Self {
        Self {
            devices: (0..count as u32).collect(),
        }
    }

    /// Pool from explicit ids, in the given order
    pub fn from_ids(devices: Vec<u32>) -> Self {
        Self { devices }
    }

    /// Empty pool
    pub fn cpu_only() -> Self {
        Self::default()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True in CPU-only mode
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device ids
    pub fn ids(&self) -> &[u32] {
        &self.devices
    }

    /// Round-robin slot for the job at `index`
    pub fn slot(&self, index: usize) -> Option<u32> {
        if self.devices.is_empty() {
            None
        } else {
            Some(self.devices[index % self.devices.len()])
        }
    }
}

/// Effective concurrency bound: `min(max, devices)` with devices present,
/// otherwise `min(max, cpus)`. Never below 1.
pub fn effective_concurrency(max_concurrent: usize, device_count: usize, cpu_count: usize) -> usize {
    let bound = if device_count > 0 {
        max_concurrent.min(device_count)
    } else {
        max_concurrent.min(cpu_count)
    };
    bound.max(1)
}

/// Fixed parts of every invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationTemplate {
    /// Prediction executable
    pub executable: PathBuf,
    /// Optional interpreter placed before the executable
    pub interpreter: Option<String>,
    /// Template date passthrough
    pub template_date: String,
    /// Root under which per-job directories are created
    pub output_root: PathBuf,
    /// Variable carrying the device hint
    pub device_env_var: String,
}

impl InvocationTemplate {
    /// Build from the runtime configuration
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            interpreter: config.interpreter.clone(),
            template_date: config.template_date.clone(),
            output_root: config.output_dir.clone(),
            device_env_var: config.device_env_var.clone(),
        }
    }

    /// Concrete command for one job on one device slot
    pub fn render(&self, job: &Job, device: Option<u32>) -> InvocationCommand {
        let output_dir = self.output_root.join(&job.id);

        let mut args: Vec<OsString> = Vec::with_capacity(7);
        let program = match &self.interpreter {
            Some(interpreter) => {
                args.push(self.executable.clone().into_os_string());
                PathBuf::from(interpreter)
            }
            None => self.executable.clone(),
        };
        args.push("--json_path".into());
        args.push(job.input.clone().into_os_string());
        args.push("--output_dir".into());
        args.push(output_dir.clone().into_os_string());
        args.push("--max_template_date".into());
        args.push(self.template_date.clone().into());

        InvocationCommand {
            program,
            args,
            output_dir,
            device_env_var: self.device_env_var.clone(),
            device,
        }
    }
}

/// Everything needed to spawn one job's process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationCommand {
    /// Program to execute
    pub program: PathBuf,
    /// Arguments
    pub args: Vec<OsString>,
    /// Per-job output directory
    pub output_dir: PathBuf,
    /// Variable carrying the device hint
    pub device_env_var: String,
    /// Device hint; None removes the variable from the child's environment
    pub device: Option<u32>,
}

impl InvocationCommand {
    /// Value of the device variable for the child, if any
    pub fn device_hint(&self) -> Option<String> {
        self.device.map(|d| d.to_string())
    }

    /// Shell-like rendering for logs
    pub fn display(&self) -> String {
        let mut out = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }

    /// Program name as shown in errors
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// A job paired with its device slot and command
#[derive(Debug, Clone)]
pub struct TaskAssignment {
    /// Position in the sorted job list
    pub index: usize,
    /// The job, still Pending
    pub job: Job,
    /// Command to run
    pub command: InvocationCommand,
}

impl TaskAssignment {
    /// Advisory device
    pub fn device(&self) -> Option<u32> {
        self.job.device
    }
}

/// Output of the scheduler
#[derive(Debug, Clone)]
pub struct SchedulePlan {
    /// One assignment per job, in job order
    pub assignments: Vec<TaskAssignment>,
    /// Worker pool size
    pub concurrency: usize,
    /// Devices used for assignment
    pub pool: DevicePool,
}

impl SchedulePlan {
    /// Number of tasks to dispatch
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// True when there is nothing to dispatch
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// `(job id, device)` pairs in job order
    pub fn mapping(&self) -> Vec<(String, Option<u32>)> {
        self.assignments
            .iter()
            .map(|a| (a.job.id.clone(), a.device()))
            .collect()
    }
}

/// Round-robin device scheduler
#[derive(Debug, Clone)]
pub struct Scheduler {
    pool: DevicePool,
    max_concurrent: usize,
    cpu_count: usize,
}

impl Scheduler {
    /// Create a scheduler. `cpu_count` only matters when the pool is empty.
    pub fn new(pool: DevicePool, max_concurrent: usize, cpu_count: usize) -> Self {
        Self {
            pool,
            max_concurrent,
            cpu_count,
        }
    }

    /// Device for the job at `index`
    pub fn device_for(&self, index: usize) -> Option<u32> {
        self.pool.slot(index)
    }

    /// Worker pool size
    pub fn concurrency_bound(&self) -> usize {
        effective_concurrency(self.max_concurrent, self.pool.len(), self.cpu_count)
    }

    /// Assign devices and commands. `jobs` must already be in sorted order.
    pub fn plan(&self, jobs: Vec<Job>, template: &InvocationTemplate) -> SchedulePlan {
        let assignments = jobs
            .into_iter()
            .enumerate()
            .map(|(index, mut job)| {
                let device = self.device_for(index);
                job.device = device;
                let command = template.render(&job, device);
                TaskAssignment {
                    index,
                    job,
                    command,
                }
            })
            .collect::<Vec<_>>();

        let concurrency = self.concurrency_bound();

        tracing::info!(
            jobs = assignments.len(),
            devices = self.pool.len(),
            concurrency,
            mode = if self.pool.is_empty() { "cpu" } else { "gpu" },
            "Schedule planned"
        );

        SchedulePlan {
            assignments,
            concurrency,
            pool: self.pool.clone(),
        }
    }
}
