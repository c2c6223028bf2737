//! Prelude module for common re-exports.
//!
//! `use cadence_common::prelude::*;` pulls in the types most consumers need
//! without listing individual paths.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CYCLE_TIME, DEFAULT_CYCLE_TIME_US};
