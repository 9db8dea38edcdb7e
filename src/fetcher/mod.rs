// src/fetcher/mod.rs

//! Background fetching: the per-query pipeline and the timer that drives it.

pub mod pipeline;
pub mod scheduler;
#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{FetchOutcome, FetchPipeline};
pub use scheduler::{FetchScheduler, SchedulerStatus, SkipReason, TickOutcome};
