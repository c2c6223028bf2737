//! CADENCE runtime: fixed-period pacing around the command scheduler.
//!
//! [`CycleRunner`] drives [`cadence_core::CommandScheduler`] at a
//! configurable period, with optional PREEMPT_RT setup behind the `rt`
//! feature (memory locking, CPU pinning, SCHED_FIFO).

pub mod config;
pub mod cycle;

pub use config::RuntimeConfig;
pub use cycle::{rt_setup, CycleRunner, CycleStats, RuntimeError};
