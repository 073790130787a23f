//! Cooperative Poll Scheduler for OBD-II Channels
//!
//! Walks the channel catalog one request at a time, handing each decoded
//! reading to a log sink, then idles until the next cycle is due. Every
//! call to `step` does a bounded amount of work and returns.

mod scheduler;

pub use scheduler::{Phase, PollScheduler, SchedulerConfig, SchedulerStats, SkipReason, StepEvent};
