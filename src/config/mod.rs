//! Configuration module for FoldBatch
//!
//! Provides CLI argument parsing and the runtime batch configuration.

mod settings;

pub use settings::*;
