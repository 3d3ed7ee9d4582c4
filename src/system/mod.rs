//! Host resource detection
//!
//! Accelerator discovery plus a CPU/memory snapshot used for logging,
//! the `resources` subcommand and the CPU-mode concurrency bound.

mod devices;
mod resources;

pub use devices::*;
pub use resources::*;
