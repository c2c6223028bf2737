//! CADENCE Core — cooperative tick-driven command scheduling.
//!
//! The engine that decides, every control cycle, which units of work run,
//! which are interrupted, and how boolean input conditions translate into
//! edge-triggered actions. Single-threaded and cooperative: the host calls
//! [`scheduler::CommandScheduler::tick`] exactly once per control cycle and
//! no hook may block.
//!
//! # Module Structure
//!
//! - [`subsystem`] - Claim units wrapping hardware device handles
//! - [`command`] - The command trait, lifecycle state, closure builders
//! - [`group`] - Sequential / parallel / race / conditional compositions
//! - [`trigger`] - Edge-detected boolean conditions with bindings
//! - [`input`] - Host-fed raw boolean/axis input cells
//! - [`scheduler`] - Registry, admission, claims, the tick loop body
//!
//! # Example
//!
//! ```
//! use cadence_core::command::FnCommand;
//! use cadence_core::scheduler::CommandScheduler;
//! use cadence_core::subsystem::{Subsystem, shared_subsystem};
//!
//! struct Claw;
//! impl Subsystem for Claw {
//!     fn name(&self) -> &str { "claw" }
//! }
//!
//! let mut scheduler = CommandScheduler::new();
//! let claw = shared_subsystem(Claw);
//! scheduler.register_subsystem(claw.clone()).unwrap();
//!
//! let grab = FnCommand::new("grab").requires(claw.clone()).into_shared();
//! scheduler.schedule(grab.clone());
//! scheduler.tick(); // admits `grab`, runs init
//! scheduler.tick(); // executes `grab`; it finishes
//! assert!(!scheduler.is_scheduled(&grab));
//! ```

pub mod command;
pub mod group;
pub mod input;
pub mod scheduler;
pub mod subsystem;
pub mod trigger;

pub use command::{Command, CommandError, CommandKey, CommandState, SharedCommand};
pub use scheduler::{CommandScheduler, SchedulerError, SchedulerStats, TickEvents};
pub use subsystem::{SharedSubsystem, Subsystem, SubsystemKey};
pub use trigger::{SharedTrigger, Trigger};
