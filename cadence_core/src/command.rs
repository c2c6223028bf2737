//! Commands — units of work with an explicit lifecycle.
//!
//! A command declares the subsystems it needs exclusive use of and exposes
//! four hooks the scheduler drives: `init` once at admission, `execute` and
//! `is_finished` every tick while running, and `end(interrupted)` exactly
//! once when the run is over. All hooks return `Result`; an `Err` ends the
//! command as interrupted without stopping the scheduler (the workspace
//! builds with `panic = "abort"`, so faults must travel as values).
//!
//! Lifecycle, tracked by the scheduler per running command:
//!
//! ```text
//! Idle → Initializing → Running → Ending → Idle
//! ```
//!
//! A command that has ended is dropped by the scheduler; re-submitting the
//! same shared handle starts a fresh run from `init`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use static_assertions::assert_eq_size;
use thiserror::Error;

use crate::subsystem::SharedSubsystem;

// ─── Errors ─────────────────────────────────────────────────────────

/// Fault raised by a command hook.
///
/// Carried as a value; the scheduler logs it, ends the command as
/// interrupted, and finishes the tick.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandError {
    /// Human-readable fault description.
    pub message: String,
}

impl CommandError {
    /// Build a fault from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of the infallible-by-default hooks (`init`/`execute`/`end`).
pub type HookResult = Result<(), CommandError>;

// ─── Lifecycle State ────────────────────────────────────────────────

/// Scheduler-tracked lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandState {
    /// Not scheduled.
    Idle = 0,
    /// Admitted this tick; `init` in progress.
    Initializing = 1,
    /// Advancing every tick (`execute` + `is_finished`).
    Running = 2,
    /// `end` in progress; claims released within the same tick.
    Ending = 3,
}

assert_eq_size!(CommandState, u8);

impl CommandState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Initializing),
            2 => Some(Self::Running),
            3 => Some(Self::Ending),
            _ => None,
        }
    }
}

impl Default for CommandState {
    fn default() -> Self {
        Self::Idle
    }
}

// ─── Command Trait ──────────────────────────────────────────────────

/// One unit of work.
///
/// The requirement set is built once at construction (clone the shared
/// subsystem handles in) and must stay stable for the life of the command;
/// the scheduler reads it at admission time.
pub trait Command {
    /// Stable human-readable name, used for logging and error messages.
    fn name(&self) -> &str {
        "command"
    }

    /// Subsystems this command claims exclusively while running.
    ///
    /// An empty set means no exclusivity: the command is always admitted
    /// and runs alongside anything.
    fn requirements(&self) -> &[SharedSubsystem] {
        &[]
    }

    /// Whether the scheduler may end this command early to admit a
    /// conflicting one. `cancel` ignores this flag.
    fn is_interruptible(&self) -> bool {
        true
    }

    /// Invoked once when the command is admitted.
    fn init(&mut self) -> HookResult {
        Ok(())
    }

    /// Invoked every tick while running.
    fn execute(&mut self) -> HookResult {
        Ok(())
    }

    /// Polled after `execute` each tick; `Ok(true)` ends the run naturally.
    fn is_finished(&mut self) -> Result<bool, CommandError> {
        Ok(true)
    }

    /// Invoked exactly once per run. `interrupted` is `false` for a natural
    /// finish, `true` for cancel, preemption, or a hook fault.
    fn end(&mut self, _interrupted: bool) -> HookResult {
        Ok(())
    }
}

/// Shared handle to a command.
pub type SharedCommand = Rc<RefCell<dyn Command>>;

/// Identity key of a command handle (thin data pointer of the `Rc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandKey(*const ());

impl CommandKey {
    /// Key of the given handle. Accepts concrete and `dyn` handles alike.
    pub fn of<C: Command + ?Sized>(command: &Rc<RefCell<C>>) -> Self {
        Self(Rc::as_ptr(command).cast::<()>())
    }
}

/// Wrap a concrete command into a shareable handle.
pub fn shared_command<C: Command + 'static>(command: C) -> SharedCommand {
    Rc::new(RefCell::new(command))
}

// ─── Closure-Based Commands ─────────────────────────────────────────

type InitHook = Box<dyn FnMut() -> HookResult>;
type ExecuteHook = Box<dyn FnMut() -> HookResult>;
type FinishedHook = Box<dyn FnMut() -> Result<bool, CommandError>>;
type EndHook = Box<dyn FnMut(bool) -> HookResult>;

/// Command assembled from closures instead of a dedicated struct.
///
/// Defaults match the trait: every hook a no-op, finishes on its first
/// tick, interruptible. Used for small one-off behaviors and throughout
/// the test suites.
///
/// ```
/// use cadence_core::command::FnCommand;
///
/// let mut ticks = 0_u32;
/// let _blink = FnCommand::new("blink")
///     .on_execute(move || ticks += 1)
///     .until(|| true)
///     .into_shared();
/// ```
pub struct FnCommand {
    name: String,
    requirements: Vec<SharedSubsystem>,
    interruptible: bool,
    init: Option<InitHook>,
    execute: Option<ExecuteHook>,
    finished: Option<FinishedHook>,
    end: Option<EndHook>,
}

impl FnCommand {
    /// Start building a command with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirements: Vec::new(),
            interruptible: true,
            init: None,
            execute: None,
            finished: None,
            end: None,
        }
    }

    /// Add a required subsystem (claimed exclusively while running).
    pub fn requires(mut self, subsystem: SharedSubsystem) -> Self {
        self.requirements.push(subsystem);
        self
    }

    /// Mark the command as not preemptable by conflicting admissions.
    pub fn uninterruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }

    /// Infallible `init` hook.
    pub fn on_init(mut self, mut f: impl FnMut() + 'static) -> Self {
        self.init = Some(Box::new(move || {
            f();
            Ok(())
        }));
        self
    }

    /// Fallible `init` hook.
    pub fn try_init(mut self, f: impl FnMut() -> HookResult + 'static) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    /// Infallible `execute` hook.
    pub fn on_execute(mut self, mut f: impl FnMut() + 'static) -> Self {
        self.execute = Some(Box::new(move || {
            f();
            Ok(())
        }));
        self
    }

    /// Fallible `execute` hook.
    pub fn try_execute(mut self, f: impl FnMut() -> HookResult + 'static) -> Self {
        self.execute = Some(Box::new(f));
        self
    }

    /// Finish condition. Without one the command finishes on its first tick.
    pub fn until(mut self, mut f: impl FnMut() -> bool + 'static) -> Self {
        self.finished = Some(Box::new(move || Ok(f())));
        self
    }

    /// Fallible finish condition.
    pub fn try_until(mut self, f: impl FnMut() -> Result<bool, CommandError> + 'static) -> Self {
        self.finished = Some(Box::new(f));
        self
    }

    /// Never finishes on its own; runs until cancelled or preempted.
    pub fn runs_forever(self) -> Self {
        self.until(|| false)
    }

    /// Infallible `end` hook.
    pub fn on_end(mut self, mut f: impl FnMut(bool) + 'static) -> Self {
        self.end = Some(Box::new(move |interrupted| {
            f(interrupted);
            Ok(())
        }));
        self
    }

    /// Wrap into a shared handle ready for scheduling.
    pub fn into_shared(self) -> SharedCommand {
        Rc::new(RefCell::new(self))
    }
}

impl Command for FnCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[SharedSubsystem] {
        &self.requirements
    }

    fn is_interruptible(&self) -> bool {
        self.interruptible
    }

    fn init(&mut self) -> HookResult {
        match &mut self.init {
            Some(f) => f(),
            None => Ok(()),
        }
    }

    fn execute(&mut self) -> HookResult {
        match &mut self.execute {
            Some(f) => f(),
            None => Ok(()),
        }
    }

    fn is_finished(&mut self) -> Result<bool, CommandError> {
        match &mut self.finished {
            Some(f) => f(),
            None => Ok(true),
        }
    }

    fn end(&mut self, interrupted: bool) -> HookResult {
        match &mut self.end {
            Some(f) => f(interrupted),
            None => Ok(()),
        }
    }
}

/// One-shot command: runs a closure once and finishes the same tick.
pub struct InstantCommand {
    name: String,
    requirements: Vec<SharedSubsystem>,
    action: Box<dyn FnMut()>,
}

impl InstantCommand {
    /// Build from a closure.
    pub fn new(name: impl Into<String>, action: impl FnMut() + 'static) -> Self {
        Self {
            name: name.into(),
            requirements: Vec::new(),
            action: Box::new(action),
        }
    }

    /// Add a required subsystem.
    pub fn requires(mut self, subsystem: SharedSubsystem) -> Self {
        self.requirements.push(subsystem);
        self
    }

    /// Wrap into a shared handle ready for scheduling.
    pub fn into_shared(self) -> SharedCommand {
        Rc::new(RefCell::new(self))
    }
}

impl Command for InstantCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[SharedSubsystem] {
        &self.requirements
    }

    fn execute(&mut self) -> HookResult {
        (self.action)();
        Ok(())
    }
}

/// Does nothing until the given wall-clock duration has elapsed.
///
/// Useful inside sequential groups for fixed-delay choreography.
pub struct WaitCommand {
    duration: Duration,
    deadline: Option<Instant>,
}

impl WaitCommand {
    /// Wait for the given duration, measured from `init`.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
        }
    }

    /// Wrap into a shared handle ready for scheduling.
    pub fn into_shared(self) -> SharedCommand {
        Rc::new(RefCell::new(self))
    }
}

impl Command for WaitCommand {
    fn name(&self) -> &str {
        "wait"
    }

    fn init(&mut self) -> HookResult {
        self.deadline = Some(Instant::now() + self.duration);
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool, CommandError> {
        match self.deadline {
            Some(deadline) => Ok(Instant::now() >= deadline),
            None => Err(CommandError::new("wait command polled before init")),
        }
    }

    fn end(&mut self, _interrupted: bool) -> HookResult {
        self.deadline = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn command_state_from_u8_roundtrip() {
        for value in 0..4_u8 {
            let state = CommandState::from_u8(value).unwrap();
            assert_eq!(state as u8, value);
        }
        assert_eq!(CommandState::from_u8(4), None);
        assert_eq!(CommandState::default(), CommandState::Idle);
    }

    #[test]
    fn fn_command_defaults_finish_immediately() {
        let mut cmd = FnCommand::new("noop");
        assert!(cmd.init().is_ok());
        assert!(cmd.execute().is_ok());
        assert_eq!(cmd.is_finished().unwrap(), true);
        assert!(cmd.end(false).is_ok());
        assert!(cmd.is_interruptible());
    }

    #[test]
    fn fn_command_runs_forever_until_flag() {
        let mut cmd = FnCommand::new("hold").runs_forever();
        assert_eq!(cmd.is_finished().unwrap(), false);
    }

    #[test]
    fn fn_command_hooks_fire() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let mut cmd = FnCommand::new("traced")
            .on_init(move || l1.borrow_mut().push("init"))
            .on_execute(move || l2.borrow_mut().push("execute"))
            .on_end(move |interrupted| {
                l3.borrow_mut().push(if interrupted { "end(true)" } else { "end(false)" })
            });

        cmd.init().unwrap();
        cmd.execute().unwrap();
        cmd.end(true).unwrap();
        assert_eq!(*log.borrow(), vec!["init", "execute", "end(true)"]);
    }

    #[test]
    fn fn_command_fault_propagates() {
        let mut cmd =
            FnCommand::new("faulty").try_execute(|| Err(CommandError::new("sensor offline")));
        let err = cmd.execute().unwrap_err();
        assert_eq!(err.message, "sensor offline");
    }

    #[test]
    fn instant_command_runs_action_and_finishes() {
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        let mut cmd = InstantCommand::new("fire", move || flag.set(true));
        cmd.init().unwrap();
        cmd.execute().unwrap();
        assert!(fired.get());
        assert_eq!(cmd.is_finished().unwrap(), true);
    }

    #[test]
    fn wait_command_respects_duration() {
        let mut cmd = WaitCommand::new(Duration::from_millis(0));
        cmd.init().unwrap();
        assert_eq!(cmd.is_finished().unwrap(), true);

        let mut long = WaitCommand::new(Duration::from_secs(3600));
        long.init().unwrap();
        assert_eq!(long.is_finished().unwrap(), false);
    }

    #[test]
    fn wait_command_polled_before_init_is_a_fault() {
        let mut cmd = WaitCommand::new(Duration::from_millis(1));
        assert!(cmd.is_finished().is_err());
    }

    #[test]
    fn command_key_tracks_handle_identity() {
        let a = FnCommand::new("a").into_shared();
        let b = a.clone();
        let c = FnCommand::new("a").into_shared();
        assert_eq!(CommandKey::of(&a), CommandKey::of(&b));
        assert_ne!(CommandKey::of(&a), CommandKey::of(&c));
    }
}
