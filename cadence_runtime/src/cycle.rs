//! Fixed-period cycle loop around [`CommandScheduler::tick`].
//!
//! One cycle = feed inputs (host hook) → `tick()` → sleep to the next
//! period boundary. Two pacing strategies:
//!
//! - **Simulation** (default): `std::thread::sleep` for the remainder of
//!   the period. Approximate timing, runs anywhere.
//! - **RT** (`rt` feature): `clock_nanosleep(TIMER_ABSTIME)` on
//!   `CLOCK_MONOTONIC` for drift-free pacing, after locking memory,
//!   pinning the thread, and switching to `SCHED_FIFO` via [`rt_setup`].
//!
//! Overruns (tick longer than the period) are always counted; whether
//! they abort the run is a configuration choice.

use cadence_core::CommandScheduler;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RuntimeConfig;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
///
/// Updated every cycle with no allocation.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of overruns detected.
    pub overruns: u64,
    /// Maximum wake-up latency [ns] (expected vs actual wake, RT only).
    pub max_latency_ns: i64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during RT setup or cycle execution.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// A cycle exceeded its period and the runner is configured to abort.
    #[error("cycle overrun: {actual_ns}ns > {budget_ns}ns budget")]
    CycleOverrun {
        /// Actual cycle duration [ns].
        actual_ns: i64,
        /// Configured cycle budget [ns].
        budget_ns: i64,
    },
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages (prevent page faults in RT loop).
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RuntimeError> {
    use nix::sys::mman::{mlockall, MlockallFlags};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RuntimeError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RuntimeError> {
    Ok(()) // No-op in simulation mode
}

/// Prefault stack pages to prevent page faults during RT execution.
fn prefault_stack() {
    // Touch 1 MB of stack to prefault pages.
    let mut buf = [0u8; 1024 * 1024];
    // Prevent compiler from optimizing away the write.
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a specific CPU core.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RuntimeError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| RuntimeError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| RuntimeError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), RuntimeError> {
    Ok(()) // No-op in simulation mode
}

/// Set SCHED_FIFO with the given RT priority.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RuntimeError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(RuntimeError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RuntimeError> {
    Ok(()) // No-op in simulation mode
}

/// Perform the full RT setup sequence.
///
/// Must be called before entering the cycle loop. In simulation mode
/// (no `rt` feature), all RT calls are no-ops.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), RuntimeError> {
    // 1. Lock all memory pages.
    rt_mlockall()?;

    // 2. Prefault stack pages.
    prefault_stack();

    // 3. Pin to CPU core.
    rt_set_affinity(cpu_core)?;

    // 4. Set RT scheduler.
    rt_set_scheduler(rt_priority)?;

    Ok(())
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Paces a [`CommandScheduler`] at a fixed period.
///
/// Owns the scheduler; the host feeds inputs through the `before_tick`
/// hook passed to [`run_cycles`](CycleRunner::run_cycles).
pub struct CycleRunner {
    scheduler: CommandScheduler,
    /// Configured cycle time [ns].
    cycle_time_ns: i64,
    abort_on_overrun: bool,
    stats: CycleStats,
}

impl CycleRunner {
    /// Create a runner from a validated configuration.
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            scheduler: CommandScheduler::new(),
            cycle_time_ns: i64::from(config.cycle_time_us) * 1000,
            abort_on_overrun: config.abort_on_overrun,
            stats: CycleStats::new(),
        }
    }

    /// Create a runner with an explicit period, no config file needed.
    pub fn with_cycle_time(cycle_time: Duration) -> Self {
        Self {
            scheduler: CommandScheduler::new(),
            cycle_time_ns: cycle_time.as_nanos() as i64,
            abort_on_overrun: false,
            stats: CycleStats::new(),
        }
    }

    /// Abort the run on the first overrun instead of logging it.
    pub fn abort_on_overrun(mut self, abort: bool) -> Self {
        self.abort_on_overrun = abort;
        self
    }

    pub fn scheduler(&self) -> &CommandScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut CommandScheduler {
        &mut self.scheduler
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run `cycles` paced scheduler ticks.
    ///
    /// `before_tick` runs at the start of each cycle, before the
    /// scheduler advances; use it to push fresh input values into the
    /// registered triggers. It receives the cycle index starting at 0.
    ///
    /// # Errors
    /// Returns `RuntimeError::CycleOverrun` on the first overrun when
    /// `abort_on_overrun` is set. With the `rt` feature, clock failures
    /// surface as `RuntimeError::RtSetup`.
    pub fn run_cycles(
        &mut self,
        cycles: u64,
        before_tick: impl FnMut(u64, &mut CommandScheduler),
    ) -> Result<(), RuntimeError> {
        self.run_loop(Some(cycles), || false, before_tick)
    }

    /// Run paced scheduler ticks until `stop` returns true, checked at
    /// the start of every cycle. Same hook and error semantics as
    /// [`run_cycles`](CycleRunner::run_cycles).
    pub fn run_until(
        &mut self,
        stop: impl FnMut() -> bool,
        before_tick: impl FnMut(u64, &mut CommandScheduler),
    ) -> Result<(), RuntimeError> {
        self.run_loop(None, stop, before_tick)
    }

    fn run_loop(
        &mut self,
        limit: Option<u64>,
        stop: impl FnMut() -> bool,
        before_tick: impl FnMut(u64, &mut CommandScheduler),
    ) -> Result<(), RuntimeError> {
        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(limit, stop, before_tick)
        }

        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(limit, stop, before_tick)
        }
    }

    /// Cancel everything in flight and wind the scheduler down.
    pub fn shutdown(&mut self) {
        debug!(
            "runner shutdown after {} cycles ({} overruns)",
            self.stats.cycle_count, self.stats.overruns
        );
        self.scheduler.reset();
    }

    /// RT cycle loop using `clock_nanosleep(TIMER_ABSTIME)`.
    #[cfg(feature = "rt")]
    fn run_rt_loop(
        &mut self,
        limit: Option<u64>,
        mut stop: impl FnMut() -> bool,
        mut before_tick: impl FnMut(u64, &mut CommandScheduler),
    ) -> Result<(), RuntimeError> {
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

        let clock = ClockId::CLOCK_MONOTONIC;
        let mut next_wake = clock_gettime(clock)
            .map_err(|e| RuntimeError::RtSetup(format!("clock_gettime: {e}")))?;

        let mut cycle: u64 = 0;
        while limit.is_none_or(|n| cycle < n) {
            if stop() {
                break;
            }
            // Advance next wake time.
            next_wake = timespec_add_ns(next_wake, self.cycle_time_ns);

            let cycle_start = clock_gettime(clock)
                .map_err(|e| RuntimeError::RtSetup(format!("clock_gettime: {e}")))?;
            let wake_latency_ns = timespec_diff_ns(&cycle_start, &next_wake).abs();

            before_tick(cycle, &mut self.scheduler);
            self.scheduler.tick();

            let cycle_end = clock_gettime(clock)
                .map_err(|e| RuntimeError::RtSetup(format!("clock_gettime: {e}")))?;
            let duration_ns = timespec_diff_ns(&cycle_end, &cycle_start);

            self.stats.record(duration_ns, wake_latency_ns);

            if duration_ns > self.cycle_time_ns {
                self.stats.overruns += 1;
                if self.abort_on_overrun {
                    return Err(RuntimeError::CycleOverrun {
                        actual_ns: duration_ns,
                        budget_ns: self.cycle_time_ns,
                    });
                }
                warn!(
                    "cycle {} overrun: {}ns > {}ns budget",
                    cycle, duration_ns, self.cycle_time_ns
                );
            }

            // Sleep until next cycle boundary (absolute time).
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
            cycle += 1;
        }

        Ok(())
    }

    /// Simulation cycle loop using `std::thread::sleep`.
    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(
        &mut self,
        limit: Option<u64>,
        mut stop: impl FnMut() -> bool,
        mut before_tick: impl FnMut(u64, &mut CommandScheduler),
    ) -> Result<(), RuntimeError> {
        use std::time::Instant;

        let cycle_duration = Duration::from_nanos(self.cycle_time_ns as u64);

        let mut cycle: u64 = 0;
        while limit.is_none_or(|n| cycle < n) {
            if stop() {
                break;
            }
            let cycle_start = Instant::now();

            before_tick(cycle, &mut self.scheduler);
            self.scheduler.tick();

            let elapsed = cycle_start.elapsed();
            let duration_ns = elapsed.as_nanos() as i64;

            self.stats.record(duration_ns, 0);

            if duration_ns > self.cycle_time_ns {
                self.stats.overruns += 1;
                if self.abort_on_overrun {
                    return Err(RuntimeError::CycleOverrun {
                        actual_ns: duration_ns,
                        budget_ns: self.cycle_time_ns,
                    });
                }
                warn!(
                    "cycle {} overrun: {}ns > {}ns budget",
                    cycle, duration_ns, self.cycle_time_ns
                );
            }

            // Sleep for remaining time.
            if let Some(remaining) = cycle_duration.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
            cycle += 1;
        }

        Ok(())
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a - b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_stats_basic() {
        let mut stats = CycleStats::new();
        assert_eq!(stats.cycle_count, 0);
        assert_eq!(stats.avg_cycle_ns(), 0);

        stats.record(500_000, 1_000);
        assert_eq!(stats.cycle_count, 1);
        assert_eq!(stats.last_cycle_ns, 500_000);
        assert_eq!(stats.min_cycle_ns, 500_000);
        assert_eq!(stats.max_cycle_ns, 500_000);
        assert_eq!(stats.max_latency_ns, 1_000);
        assert_eq!(stats.avg_cycle_ns(), 500_000);

        stats.record(600_000, 500);
        assert_eq!(stats.cycle_count, 2);
        assert_eq!(stats.min_cycle_ns, 500_000);
        assert_eq!(stats.max_cycle_ns, 600_000);
        assert_eq!(stats.max_latency_ns, 1_000); // Max unchanged.
        assert_eq!(stats.avg_cycle_ns(), 550_000);
    }

    #[test]
    fn rt_setup_no_rt_feature_is_noop() {
        #[cfg(not(feature = "rt"))]
        {
            let result = rt_setup(0, 80);
            assert!(result.is_ok());
        }
    }

    #[test]
    fn overrun_error_display() {
        let err = RuntimeError::CycleOverrun {
            actual_ns: 1_500_000,
            budget_ns: 1_000_000,
        };
        let msg = format!("{err}");
        assert!(msg.contains("1500000"));
        assert!(msg.contains("1000000"));
    }
}
