//! Batch scheduling for gear replays.
//!
//! Collects a population of work units, filters it, cuts it into ordered
//! batches and dispatches one job per batch, strictly one batch at a time.

pub mod filter;
pub mod pool;
pub mod scheduler;

pub use filter::{FilterOutcome, SkipReason, SkippedUnit, UnitFilter};
pub use pool::{Batch, BatchPool};
pub use scheduler::{BatchOutcome, BatchRunReport, BatchScheduler, BatchStatus, SchedulerState};
