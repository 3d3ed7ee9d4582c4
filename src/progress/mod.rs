//! Progress reporting module
//!
//! Provides a live batch progress bar with per-status counters.

mod reporter;

pub use reporter::*;
