//! Runtime configuration for the cycle runner.

use std::time::Duration;

use cadence_common::config::{ConfigError, SharedConfig};
use serde::{Deserialize, Serialize};

use cadence_common::consts::{DEFAULT_CPU_CORE, DEFAULT_CYCLE_TIME_US, DEFAULT_RT_PRIORITY};

/// Configuration for a [`CycleRunner`](crate::cycle::CycleRunner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Shared service-level settings (log level, service name).
    #[serde(default)]
    pub shared: SharedConfig,

    /// Cycle period in microseconds.
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,

    /// CPU core the cycle thread is pinned to (`rt` feature only).
    #[serde(default = "default_cpu_core")]
    pub cpu_core: usize,

    /// SCHED_FIFO priority for the cycle thread (`rt` feature only).
    #[serde(default = "default_rt_priority")]
    pub rt_priority: i32,

    /// Abort the run on the first cycle overrun instead of logging it.
    #[serde(default)]
    pub abort_on_overrun: bool,
}

fn default_cycle_time_us() -> u32 {
    DEFAULT_CYCLE_TIME_US
}

fn default_cpu_core() -> usize {
    DEFAULT_CPU_CORE
}

fn default_rt_priority() -> i32 {
    DEFAULT_RT_PRIORITY
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            cycle_time_us: default_cycle_time_us(),
            cpu_core: default_cpu_core(),
            rt_priority: default_rt_priority(),
            abort_on_overrun: false,
        }
    }
}

impl RuntimeConfig {
    /// The cycle period as a [`Duration`].
    pub fn cycle_time(&self) -> Duration {
        Duration::from_micros(u64::from(self.cycle_time_us))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.cycle_time_us == 0 {
            return Err(ConfigError::ValidationError(
                "cycle_time_us must be greater than zero".to_string(),
            ));
        }

        if !(1..=99).contains(&self.rt_priority) {
            return Err(ConfigError::ValidationError(format!(
                "rt_priority must be in 1..=99, got {}",
                self.rt_priority
            )));
        }

        Ok(())
    }
}
