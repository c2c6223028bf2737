//! System-wide constants shared across CADENCE crates.

use std::time::Duration;

/// Default control cycle time in microseconds (20ms = 50Hz).
///
/// Matches the nominal loop rate of the robot controllers this scheduler
/// targets; the runtime loop reads the actual value from configuration.
pub const DEFAULT_CYCLE_TIME_US: u32 = 20_000;

/// Default control cycle time as a `Duration`.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_micros(DEFAULT_CYCLE_TIME_US as u64);

/// Default CPU core for the paced loop when the `rt` feature is active.
pub const DEFAULT_CPU_CORE: usize = 1;

/// Default SCHED_FIFO priority when the `rt` feature is active.
pub const DEFAULT_RT_PRIORITY: i32 = 80;

/// Capacity hint for the scheduler's running-command list.
///
/// Purely an allocation hint; the scheduler grows past it freely.
pub const TYPICAL_RUNNING_COMMANDS: usize = 16;
