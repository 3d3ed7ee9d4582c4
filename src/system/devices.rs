//! Accelerator detection
//!
//! Asks the vendor CLI for the device list and counts the lines. Anything
//! short of a clean answer (binary missing, non-zero exit, garbage output)
//! means zero devices and CPU mode; detection never fails a run. A query
//! that hangs is killed after [`DEFAULT_QUERY_TIMEOUT`].

use crate::core::DevicePool;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Default accelerator query tool
pub const DEFAULT_DEVICE_QUERY: &str = "nvidia-smi";

/// How long the query tool may run before it is killed
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Queries the host for accelerators
#[derive(Debug, Clone)]
pub struct DeviceDetector {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for DeviceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_QUERY)
    }
}

impl DeviceDetector {
    /// Detector using `program`. `nvidia-smi` gets its CSV query arguments;
    /// any other program is run without arguments and must print one line
    /// per device.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let args = if program.ends_with(DEFAULT_DEVICE_QUERY) {
            vec![
                "--query-gpu=name".to_string(),
                "--format=csv,noheader".to_string(),
            ]
        } else {
            Vec::new()
        };
        Self {
            program,
            args,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Detector with explicit arguments
    pub fn with_args(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Replace the query timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of devices, 0 when none or when the query is unavailable
    pub fn count(&self) -> usize {
        let mut child = match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::info!(program = %self.program, error = %e, "No accelerator query tool, using CPU mode");
                return 0;
            }
        };

        // Drained on its own thread so a chatty tool cannot block on a full pipe.
        let reader = child.stdout.take().map(|mut stdout| {
            std::thread::spawn(move || {
                let mut listing = String::new();
                let _ = stdout.read_to_string(&mut listing);
                listing
            })
        });

        let status = match wait_with_deadline(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::warn!(
                    program = %self.program,
                    timeout = ?self.timeout,
                    "Accelerator query timed out, using CPU mode"
                );
                let _ = child.kill();
                let _ = child.wait();
                return 0;
            }
            Err(e) => {
                tracing::info!(program = %self.program, error = %e, "Accelerator query failed, using CPU mode");
                return 0;
            }
        };

        if !status.success() {
            tracing::info!(
                program = %self.program,
                exit_code = ?status.code(),
                "Accelerator query failed, using CPU mode"
            );
            return 0;
        }

        let listing = reader.and_then(|handle| handle.join().ok()).unwrap_or_default();
        let count = count_devices(&listing);
        tracing::info!(devices = count, "Detected accelerators");
        count
    }

    /// Device pool, honoring a fixed override when given
    pub fn pool(&self, device_override: Option<usize>) -> DevicePool {
        match device_override {
            Some(count) => {
                tracing::info!(devices = count, "Using configured device count");
                DevicePool::with_count(count)
            }
            None => DevicePool::with_count(self.count()),
        }
    }
}

/// Exit status, or `None` if the child is still running at the deadline
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// One device per non-empty line
pub fn count_devices(listing: &str) -> usize {
    listing.lines().filter(|l| !l.trim().is_empty()).count()
}
