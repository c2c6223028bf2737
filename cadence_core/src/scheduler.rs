//! The command scheduler: registry, claims, and the per-tick state machine.
//!
//! One `CommandScheduler` instance owns the whole scheduling state for a
//! control session: registered subsystems with their claim slots and
//! default commands, registered triggers, the running-command list, and the
//! pending-schedule queue. There is no global instance; the session root
//! owns the scheduler and passes it by reference to whatever needs to
//! schedule or cancel.
//!
//! `tick()` runs the five phases in strict order:
//!
//! 1. Poll every registered trigger (may enqueue schedules / apply cancels).
//! 2. Advance every running command (`execute`, `is_finished`, retire
//!    finished ones with `end(false)`).
//! 3. Admit pending requests, resolving subsystem conflicts.
//! 4. Run every subsystem's `periodic`.
//! 5. Admit default commands for subsystems left unclaimed.
//!
//! Commands admitted in phase 3 or 5 run `init` that tick and first
//! `execute` the next tick, so running commands always advance ahead of
//! newcomers. The scheduler is the sole mutator of the claim map; no hook
//! fault or rejected admission ever aborts a tick.

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandError, CommandKey, CommandState, SharedCommand};
use crate::subsystem::{SharedSubsystem, Subsystem, SubsystemKey};
use crate::trigger::SharedTrigger;

// ─── Errors ─────────────────────────────────────────────────────────

/// Configuration errors reported synchronously by registry operations.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// The subsystem handle is already registered with this scheduler.
    #[error("subsystem `{subsystem}` is already registered")]
    AlreadyRegistered {
        /// Name of the offending subsystem.
        subsystem: String,
    },

    /// The subsystem handle was never registered with this scheduler.
    #[error("subsystem `{subsystem}` is not registered")]
    UnregisteredSubsystem {
        /// Name of the offending subsystem.
        subsystem: String,
    },

    /// A default command must require the subsystem it is assigned to.
    #[error("default command `{command}` does not require subsystem `{subsystem}`")]
    DefaultNotRequiring {
        /// Name of the offending command.
        command: String,
        /// Name of the subsystem the default was assigned to.
        subsystem: String,
    },
}

// ─── Tick Events & Stats ────────────────────────────────────────────

bitflags! {
    /// Events observed during a single tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TickEvents: u8 {
        /// At least one command was admitted.
        const SCHEDULED         = 0x01;
        /// At least one command finished naturally.
        const FINISHED          = 0x02;
        /// At least one command was ended as interrupted.
        const INTERRUPTED       = 0x04;
        /// At least one admission request was rejected.
        const REJECTED          = 0x08;
        /// At least one command hook returned an error.
        const HOOK_FAULT        = 0x10;
        /// At least one default command was admitted.
        const DEFAULT_SCHEDULED = 0x20;
    }
}

/// Cumulative scheduler counters plus the last tick's event flags.
///
/// Updated O(1) per event, no allocation.
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    /// Ticks executed.
    pub ticks: u64,
    /// Commands admitted (defaults included).
    pub commands_scheduled: u64,
    /// Commands that finished naturally.
    pub commands_finished: u64,
    /// Commands ended as interrupted (cancel, preemption, or reset).
    pub commands_interrupted: u64,
    /// Admission requests rejected (conflict or unregistered requirement).
    pub admissions_rejected: u64,
    /// Hook errors observed.
    pub hook_faults: u64,
    /// Events of the most recent tick.
    pub last_tick_events: TickEvents,
}

impl SchedulerStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            ticks: 0,
            commands_scheduled: 0,
            commands_finished: 0,
            commands_interrupted: 0,
            admissions_rejected: 0,
            hook_faults: 0,
            last_tick_events: TickEvents::empty(),
        }
    }
}

impl Default for SchedulerStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Internal Bookkeeping ───────────────────────────────────────────

/// Registry slot of one subsystem: handle, default command, current claim.
struct SubsystemSlot {
    subsystem: SharedSubsystem,
    key: SubsystemKey,
    name: String,
    default_command: Option<SharedCommand>,
    claimed_by: Option<CommandKey>,
}

/// One running command with its cached admission-time attributes.
struct RunningCommand {
    command: SharedCommand,
    key: CommandKey,
    name: String,
    interruptible: bool,
    state: CommandState,
    claims: Vec<SubsystemKey>,
}

// ─── Scheduler ──────────────────────────────────────────────────────

/// Session-wide command scheduler.
///
/// Single-threaded by design: handles are `Rc`-based and every operation
/// happens on the control thread between hardware I/O points.
pub struct CommandScheduler {
    subsystems: Vec<SubsystemSlot>,
    triggers: Vec<SharedTrigger>,
    running: Vec<RunningCommand>,
    pending: Vec<SharedCommand>,
    stats: SchedulerStats,
}

impl CommandScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            subsystems: Vec::new(),
            triggers: Vec::new(),
            running: Vec::with_capacity(cadence_common::consts::TYPICAL_RUNNING_COMMANDS),
            pending: Vec::new(),
            stats: SchedulerStats::new(),
        }
    }

    // ── Registry ────────────────────────────────────────────────────

    /// Register a subsystem. Its `periodic` runs every tick from now on.
    ///
    /// # Errors
    /// `AlreadyRegistered` if this handle is already known.
    pub fn register_subsystem(&mut self, subsystem: SharedSubsystem) -> Result<(), SchedulerError> {
        let key = SubsystemKey::of(&subsystem);
        let name = subsystem.borrow().name().to_string();
        if self.slot_index(key).is_some() {
            return Err(SchedulerError::AlreadyRegistered { subsystem: name });
        }
        debug!("registered subsystem `{name}`");
        self.subsystems.push(SubsystemSlot {
            subsystem,
            key,
            name,
            default_command: None,
            claimed_by: None,
        });
        Ok(())
    }

    /// Register a trigger, polled at the start of every tick in
    /// registration order.
    pub fn register_trigger(&mut self, trigger: SharedTrigger) {
        debug!("registered trigger `{}`", trigger.borrow().name());
        self.triggers.push(trigger);
    }

    /// Assign the command admitted automatically whenever `subsystem` is
    /// left unclaimed at the end of a tick.
    ///
    /// # Errors
    /// `UnregisteredSubsystem` if the subsystem is unknown;
    /// `DefaultNotRequiring` if the command's requirement set does not
    /// contain the subsystem. Both are configuration errors reported at
    /// call time, before the session runs.
    pub fn set_default_command<S: Subsystem + ?Sized>(
        &mut self,
        subsystem: &Rc<RefCell<S>>,
        command: SharedCommand,
    ) -> Result<(), SchedulerError> {
        let key = SubsystemKey::of(subsystem);
        let Some(index) = self.slot_index(key) else {
            return Err(SchedulerError::UnregisteredSubsystem {
                subsystem: subsystem.borrow().name().to_string(),
            });
        };
        let requires_it = command
            .borrow()
            .requirements()
            .iter()
            .any(|s| SubsystemKey::of(s) == key);
        if !requires_it {
            return Err(SchedulerError::DefaultNotRequiring {
                command: command.borrow().name().to_string(),
                subsystem: self.subsystems[index].name.clone(),
            });
        }
        debug!(
            "default command `{}` set for subsystem `{}`",
            command.borrow().name(),
            self.subsystems[index].name
        );
        self.subsystems[index].default_command = Some(command);
        Ok(())
    }

    // ── Requests ────────────────────────────────────────────────────

    /// Request a command run. The request is admitted (or rejected) during
    /// the next tick's admission phase; scheduling an already-running or
    /// already-pending handle is a logged no-op.
    pub fn schedule(&mut self, command: SharedCommand) {
        let key = CommandKey::of(&command);
        if self.running_index(key).is_some() {
            debug!("schedule `{}`: already running", command.borrow().name());
            return;
        }
        if self.pending.iter().any(|c| CommandKey::of(c) == key) {
            debug!("schedule `{}`: already pending", command.borrow().name());
            return;
        }
        debug!("queued `{}`", command.borrow().name());
        self.pending.push(command);
    }

    /// Cancel a specific command, immediately and unconditionally: a
    /// running command gets `end(true)` and its claims are released
    /// regardless of its interruptible flag; a pending request is dropped.
    pub fn cancel<C: Command + ?Sized>(&mut self, command: &Rc<RefCell<C>>) {
        let key = CommandKey::of(command);
        self.pending.retain(|c| CommandKey::of(c) != key);
        if self.running_index(key).is_some() {
            self.finish(key, true);
        }
    }

    /// End every running command as interrupted, release all claims, and
    /// drop pending requests. Registered subsystems, triggers, and default
    /// commands survive so the session can be restarted without re-wiring.
    pub fn reset(&mut self) {
        let keys: Vec<CommandKey> = self.running.iter().map(|r| r.key).collect();
        for key in keys {
            self.finish(key, true);
        }
        self.pending.clear();
        info!("scheduler reset: all commands ended, claims released");
    }

    // ── Tick ────────────────────────────────────────────────────────

    /// Advance the whole system by one control cycle.
    ///
    /// Never fails and never panics on account of a command: hook errors
    /// end the offending command as interrupted and the tick completes.
    pub fn tick(&mut self) {
        self.stats.ticks += 1;
        self.stats.last_tick_events = TickEvents::empty();

        // Phase 1: triggers. Indexed with a per-item handle clone so the
        // tick body stays allocation-free.
        for index in 0..self.triggers.len() {
            let trigger = self.triggers[index].clone();
            trigger.borrow_mut().poll(self);
        }

        // Phase 2: advance running commands.
        self.advance_running();

        // Phase 3: admission.
        let pending = std::mem::take(&mut self.pending);
        for command in pending {
            self.try_admit(command, false);
        }

        // Phase 4: subsystem periodics.
        for index in 0..self.subsystems.len() {
            let subsystem = self.subsystems[index].subsystem.clone();
            subsystem.borrow_mut().periodic();
        }

        // Phase 5: default commands for unclaimed subsystems.
        self.schedule_defaults();
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// Lifecycle state of a command as tracked by this scheduler.
    /// `Idle` covers both "never scheduled" and "pending admission".
    pub fn state_of<C: Command + ?Sized>(&self, command: &Rc<RefCell<C>>) -> CommandState {
        match self.running_index(CommandKey::of(command)) {
            Some(index) => self.running[index].state,
            None => CommandState::Idle,
        }
    }

    /// Whether the command is currently running (initializing counts).
    pub fn is_scheduled<C: Command + ?Sized>(&self, command: &Rc<RefCell<C>>) -> bool {
        self.running_index(CommandKey::of(command)).is_some()
    }

    /// The command currently claiming `subsystem`, if any.
    pub fn current_claim<S: Subsystem + ?Sized>(
        &self,
        subsystem: &Rc<RefCell<S>>,
    ) -> Option<SharedCommand> {
        let index = self.slot_index(SubsystemKey::of(subsystem))?;
        let holder = self.subsystems[index].claimed_by?;
        let running = self.running_index(holder)?;
        Some(self.running[running].command.clone())
    }

    /// Scheduler counters and last-tick events.
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    // ── Internals ───────────────────────────────────────────────────

    fn slot_index(&self, key: SubsystemKey) -> Option<usize> {
        self.subsystems.iter().position(|s| s.key == key)
    }

    fn running_index(&self, key: CommandKey) -> Option<usize> {
        self.running.iter().position(|r| r.key == key)
    }

    /// Phase 2: `execute` + `is_finished` for every running command, in
    /// admission order; finished commands retire with `end(false)`.
    fn advance_running(&mut self) {
        let snapshot: Vec<CommandKey> = self.running.iter().map(|r| r.key).collect();
        for key in snapshot {
            // A command may have been retired by an earlier fault this phase.
            let Some(index) = self.running_index(key) else {
                continue;
            };
            let command = self.running[index].command.clone();

            // Hook results are bound to locals so the `RefMut` guard is
            // released before finish/fault re-borrow the command.
            let executed = command.borrow_mut().execute();
            if let Err(e) = executed {
                self.fault(key, "execute", e);
                continue;
            }
            let finished = command.borrow_mut().is_finished();
            match finished {
                Err(e) => self.fault(key, "is_finished", e),
                Ok(true) => self.finish(key, false),
                Ok(false) => {}
            }
        }
    }

    /// Admission: validate requirements, resolve conflicts without taking
    /// partial claims, then claim, init, and start the command.
    fn try_admit(&mut self, command: SharedCommand, is_default: bool) -> bool {
        let key = CommandKey::of(&command);
        if self.running_index(key).is_some() {
            debug!("admission `{}`: already running", command.borrow().name());
            return false;
        }

        let (name, requirements, interruptible) = {
            let c = command.borrow();
            (
                c.name().to_string(),
                c.requirements().to_vec(),
                c.is_interruptible(),
            )
        };

        // Every requirement must be registered; reject up front otherwise.
        let mut claims: Vec<SubsystemKey> = Vec::with_capacity(requirements.len());
        for subsystem in &requirements {
            let subsystem_key = SubsystemKey::of(subsystem);
            if self.slot_index(subsystem_key).is_none() {
                warn!(
                    "admission `{name}` rejected: subsystem `{}` not registered",
                    subsystem.borrow().name()
                );
                self.reject();
                return false;
            }
            if !claims.contains(&subsystem_key) {
                claims.push(subsystem_key);
            }
        }

        // Conflict scan before any claim is taken: a single
        // non-interruptible holder rejects the whole request.
        let mut to_interrupt: Vec<CommandKey> = Vec::new();
        for &subsystem_key in &claims {
            let slot = self.slot_index(subsystem_key).map(|i| &self.subsystems[i]);
            let Some(holder_key) = slot.and_then(|s| s.claimed_by) else {
                continue;
            };
            let Some(holder_index) = self.running_index(holder_key) else {
                continue;
            };
            if !self.running[holder_index].interruptible {
                info!(
                    "admission `{name}` rejected: `{}` holds a required subsystem and is not interruptible",
                    self.running[holder_index].name
                );
                self.reject();
                return false;
            }
            if !to_interrupt.contains(&holder_key) {
                to_interrupt.push(holder_key);
            }
        }
        for holder_key in to_interrupt {
            self.finish(holder_key, true);
        }

        // Claim every requirement, then run init.
        for &subsystem_key in &claims {
            if let Some(index) = self.slot_index(subsystem_key) {
                self.subsystems[index].claimed_by = Some(key);
            }
        }
        self.running.push(RunningCommand {
            command: command.clone(),
            key,
            name: name.clone(),
            interruptible,
            state: CommandState::Initializing,
            claims,
        });

        let initialized = command.borrow_mut().init();
        if let Err(e) = initialized {
            self.fault(key, "init", e);
            return false;
        }
        if let Some(index) = self.running_index(key) {
            self.running[index].state = CommandState::Running;
        }

        self.stats.commands_scheduled += 1;
        self.stats.last_tick_events |= TickEvents::SCHEDULED;
        if is_default {
            self.stats.last_tick_events |= TickEvents::DEFAULT_SCHEDULED;
            debug!("default command `{name}` admitted");
        } else {
            debug!("command `{name}` admitted");
        }
        true
    }

    /// Phase 5: admit defaults for unclaimed subsystems whose default is
    /// not already running.
    fn schedule_defaults(&mut self) {
        for index in 0..self.subsystems.len() {
            if self.subsystems[index].claimed_by.is_some() {
                continue;
            }
            let Some(command) = self.subsystems[index].default_command.clone() else {
                continue;
            };
            if self.running_index(CommandKey::of(&command)).is_some() {
                continue;
            }
            self.try_admit(command, true);
        }
    }

    /// Retire a running command: `end(interrupted)` first, claims released
    /// immediately after, both within the current tick.
    fn finish(&mut self, key: CommandKey, interrupted: bool) {
        let Some(index) = self.running_index(key) else {
            return;
        };
        let mut entry = self.running.remove(index);
        entry.state = CommandState::Ending;

        if let Err(e) = entry.command.borrow_mut().end(interrupted) {
            error!("command `{}` end hook failed: {e}", entry.name);
            self.stats.hook_faults += 1;
            self.stats.last_tick_events |= TickEvents::HOOK_FAULT;
        }
        self.release_claims(key);

        if interrupted {
            self.stats.commands_interrupted += 1;
            self.stats.last_tick_events |= TickEvents::INTERRUPTED;
            debug!("command `{}` ended as interrupted", entry.name);
        } else {
            self.stats.commands_finished += 1;
            self.stats.last_tick_events |= TickEvents::FINISHED;
            debug!("command `{}` finished", entry.name);
        }
    }

    /// A hook returned an error: report it and end the command as
    /// interrupted without aborting the tick.
    fn fault(&mut self, key: CommandKey, hook: &str, err: CommandError) {
        self.stats.hook_faults += 1;
        self.stats.last_tick_events |= TickEvents::HOOK_FAULT;
        let Some(index) = self.running_index(key) else {
            return;
        };
        let entry = self.running.remove(index);
        error!(
            "command `{}` {hook} hook failed: {err}; ending as interrupted",
            entry.name
        );
        if let Err(e2) = entry.command.borrow_mut().end(true) {
            error!("command `{}` end hook failed after fault: {e2}", entry.name);
        }
        self.release_claims(key);
        self.stats.commands_interrupted += 1;
        self.stats.last_tick_events |= TickEvents::INTERRUPTED;
    }

    fn reject(&mut self) {
        self.stats.admissions_rejected += 1;
        self.stats.last_tick_events |= TickEvents::REJECTED;
    }

    fn release_claims(&mut self, key: CommandKey) {
        for slot in &mut self.subsystems {
            if slot.claimed_by == Some(key) {
                slot.claimed_by = None;
            }
        }
    }
}

impl Default for CommandScheduler {
    fn default() -> Self {
        Self::new()
    }
}
