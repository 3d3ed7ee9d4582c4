//! Run summary reports
//!
//! Renders a [`BatchSummary`](crate::core::BatchSummary) into the report
//! file written at the output root, as text or JSON.

mod summary;

pub use summary::*;
