//! Host resource snapshot
//!
//! Collects CPU and memory facts once per run so the run log and the
//! `resources` subcommand can show what the scheduler worked with.

use crate::system::DeviceDetector;
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Complete host snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResources {
    /// Host name
    pub hostname: String,
    /// CPU information
    pub cpu: CpuInfo,
    /// Memory information
    pub memory: MemoryInfo,
    /// Number of accelerators reported by the query tool
    pub accelerators: usize,
}

/// CPU information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuInfo {
    /// Total number of logical CPUs
    pub logical_cores: usize,
    /// Number of physical cores
    pub physical_cores: usize,
    /// CPU model name
    pub model: String,
    /// CPU architecture
    pub arch: String,
}

/// Memory information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total physical memory in bytes
    pub total: u64,
    /// Available memory in bytes
    pub available: u64,
}

impl HostResources {
    /// Collect host information, querying accelerators with `detector`
    pub fn collect(detector: &DeviceDetector) -> Self {
        Self::with_accelerators(detector.count())
    }

    /// Collect host information for an already known accelerator count
    pub fn with_accelerators(accelerators: usize) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        HostResources {
            hostname: host_name(),
            cpu: CpuInfo::collect(&sys),
            memory: MemoryInfo::collect(&sys),
            accelerators,
        }
    }

    /// Log the snapshot at info level
    pub fn log(&self) {
        tracing::info!(
            host = %self.hostname,
            cpu = %self.cpu.model,
            logical_cores = self.cpu.logical_cores,
            physical_cores = self.cpu.physical_cores,
            memory_gib = format!("{:.1}", gib(self.memory.total)),
            available_gib = format!("{:.1}", gib(self.memory.available)),
            accelerators = self.accelerators,
            "Host resources"
        );
    }

    /// Concurrency the scheduler would allow for `max_concurrent`
    pub fn concurrency_for(&self, max_concurrent: usize) -> usize {
        crate::core::effective_concurrency(max_concurrent, self.accelerators, self.cpu.logical_cores)
    }

    /// Print host summary to console
    pub fn print_summary(&self) {
        println!("=== Host Resources ===\n");
        println!("Host: {}", self.hostname);

        println!("\nCPU:");
        println!("  Model: {}", self.cpu.model);
        println!("  Logical cores: {}", self.cpu.logical_cores);
        println!("  Physical cores: {}", self.cpu.physical_cores);
        println!("  Architecture: {}", self.cpu.arch);

        println!("\nMemory:");
        println!("  Total: {:.1} GiB", gib(self.memory.total));
        println!("  Available: {:.1} GiB", gib(self.memory.available));

        println!("\nAccelerators:");
        if self.accelerators == 0 {
            println!("  None detected (CPU mode)");
        } else {
            println!("  {} device(s): GPU 0..{}", self.accelerators, self.accelerators - 1);
        }

        println!("\nDefault concurrency (--max-concurrent 4): {}", self.concurrency_for(4));
    }
}

impl CpuInfo {
    /// Collect CPU information
    pub fn collect(sys: &System) -> Self {
        let model = sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        CpuInfo {
            logical_cores: num_cpus::get(),
            physical_cores: num_cpus::get_physical(),
            model,
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

impl MemoryInfo {
    /// Collect memory information
    pub fn collect(sys: &System) -> Self {
        MemoryInfo {
            total: sys.total_memory(),
            available: sys.available_memory(),
        }
    }
}

/// Logical CPU count used for the CPU-mode concurrency bound
pub fn cpu_count() -> usize {
    num_cpus::get()
}

/// Host name, or "unknown"
pub fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect() {
        let detector = DeviceDetector::new("/nonexistent/gpu-query-tool");
        let host = HostResources::collect(&detector);

        assert!(host.cpu.logical_cores >= 1);
        assert_eq!(host.accelerators, 0);
        assert!(host.concurrency_for(4) <= 4);
        assert!(host.concurrency_for(4) >= 1);
    }

    #[test]
    fn test_known_accelerator_count() {
        let host = HostResources::with_accelerators(2);

        assert_eq!(host.accelerators, 2);
        assert!(host.memory.total >= host.memory.available);
        assert_eq!(host.concurrency_for(4), 2);
        host.log();
    }

    #[test]
    fn test_gib() {
        assert_eq!(gib(1024 * 1024 * 1024), 1.0);
    }
}
