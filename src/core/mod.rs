//! Batch execution core
//!
//! Job model, round-robin scheduling, the bounded worker pool that runs
//! external prediction processes, and the collector that classifies
//! their outcomes.

mod batch;
mod collector;
mod dispatcher;
mod job;
mod scheduler;

pub use batch::*;
pub use collector::*;
pub use dispatcher::*;
pub use job::*;
pub use scheduler::*;
