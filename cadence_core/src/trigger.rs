//! Triggers — edge-detected boolean conditions with command bindings.
//!
//! A trigger wraps a `FnMut() -> bool` condition, polled once per tick.
//! Edge detection is strictly previous-poll vs current-poll; no debouncing
//! happens at this layer. The previous-value register starts `false`, so a
//! condition already true at the first poll counts as a rising edge.
//!
//! Binding kinds:
//!
//! - **when**: fire on the matching edge.
//! - **while**: continuous — schedule the bound command on entering the
//!   state, cancel it on leaving (not re-fired every tick). A bound
//!   callback fires on the entering edge only.
//! - **toggle**: each matching edge flips an explicit latch; the bound
//!   command is scheduled when the latch turns on and cancelled when it
//!   turns off. Callbacks fire on every matching edge. The rising-side and
//!   falling-side latches are independent, and each is shared by every
//!   toggle binding on that side of the trigger.

use std::cell::RefCell;
use std::rc::Rc;

use static_assertions::assert_eq_size;
use tracing::trace;

use crate::command::SharedCommand;
use crate::scheduler::CommandScheduler;

// ─── Bindings ───────────────────────────────────────────────────────

/// The edge/state pattern a binding reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BindingKind {
    /// Rising edge.
    WhenActivated = 0,
    /// Falling edge.
    WhenDeactivated = 1,
    /// True state: schedule on rising, cancel on falling.
    WhileActivated = 2,
    /// False state: schedule on falling, cancel on rising.
    WhileDeactivated = 3,
    /// Rising edges flip the rising latch.
    ToggleWhenActivated = 4,
    /// Falling edges flip the falling latch.
    ToggleWhenDeactivated = 5,
}

assert_eq_size!(BindingKind, u8);

enum Action {
    Schedule(SharedCommand),
    Invoke(Box<dyn FnMut()>),
}

struct Binding {
    kind: BindingKind,
    action: Action,
}

// ─── Trigger ────────────────────────────────────────────────────────

/// Shared handle to a registered trigger.
pub type SharedTrigger = Rc<RefCell<Trigger>>;

/// An edge-detected boolean condition with zero or more bound actions.
///
/// A trigger without bindings is legal and a no-op; bindings may be added
/// before registration or between polls.
pub struct Trigger {
    name: String,
    condition: Box<dyn FnMut() -> bool>,
    previous: bool,
    toggle: bool,
    inverse_toggle: bool,
    bindings: Vec<Binding>,
}

impl Trigger {
    /// Wrap a condition. The previous-value register starts `false`.
    pub fn new(name: impl Into<String>, condition: impl FnMut() -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            condition: Box::new(condition),
            previous: false,
            toggle: false,
            inverse_toggle: false,
            bindings: Vec::new(),
        }
    }

    /// Trigger name, used in logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value observed at the most recent poll.
    pub fn last_value(&self) -> bool {
        self.previous
    }

    /// Rising-side toggle latch (flipped by every rising edge).
    pub fn toggle_state(&self) -> bool {
        self.toggle
    }

    /// Falling-side toggle latch (flipped by every falling edge).
    pub fn inverse_toggle_state(&self) -> bool {
        self.inverse_toggle
    }

    /// Wrap into a shared handle ready for registration.
    pub fn into_shared(self) -> SharedTrigger {
        Rc::new(RefCell::new(self))
    }

    fn bind(&mut self, kind: BindingKind, action: Action) -> &mut Self {
        self.bindings.push(Binding { kind, action });
        self
    }

    /// Schedule `command` on every rising edge.
    pub fn when_activated(&mut self, command: SharedCommand) -> &mut Self {
        self.bind(BindingKind::WhenActivated, Action::Schedule(command))
    }

    /// Invoke `callback` on every rising edge.
    pub fn when_activated_call(&mut self, callback: impl FnMut() + 'static) -> &mut Self {
        self.bind(BindingKind::WhenActivated, Action::Invoke(Box::new(callback)))
    }

    /// Schedule `command` on every falling edge.
    pub fn when_deactivated(&mut self, command: SharedCommand) -> &mut Self {
        self.bind(BindingKind::WhenDeactivated, Action::Schedule(command))
    }

    /// Invoke `callback` on every falling edge.
    pub fn when_deactivated_call(&mut self, callback: impl FnMut() + 'static) -> &mut Self {
        self.bind(
            BindingKind::WhenDeactivated,
            Action::Invoke(Box::new(callback)),
        )
    }

    /// Keep `command` scheduled while the condition reads true.
    pub fn while_activated(&mut self, command: SharedCommand) -> &mut Self {
        self.bind(BindingKind::WhileActivated, Action::Schedule(command))
    }

    /// Invoke `callback` when the condition becomes true.
    pub fn while_activated_call(&mut self, callback: impl FnMut() + 'static) -> &mut Self {
        self.bind(
            BindingKind::WhileActivated,
            Action::Invoke(Box::new(callback)),
        )
    }

    /// Keep `command` scheduled while the condition reads false.
    pub fn while_deactivated(&mut self, command: SharedCommand) -> &mut Self {
        self.bind(BindingKind::WhileDeactivated, Action::Schedule(command))
    }

    /// Invoke `callback` when the condition becomes false.
    pub fn while_deactivated_call(&mut self, callback: impl FnMut() + 'static) -> &mut Self {
        self.bind(
            BindingKind::WhileDeactivated,
            Action::Invoke(Box::new(callback)),
        )
    }

    /// Rising edges alternate between scheduling and cancelling `command`.
    pub fn toggle_when_activated(&mut self, command: SharedCommand) -> &mut Self {
        self.bind(BindingKind::ToggleWhenActivated, Action::Schedule(command))
    }

    /// Invoke `callback` on every rising edge (latch inspectable separately).
    pub fn toggle_when_activated_call(&mut self, callback: impl FnMut() + 'static) -> &mut Self {
        self.bind(
            BindingKind::ToggleWhenActivated,
            Action::Invoke(Box::new(callback)),
        )
    }

    /// Falling edges alternate between scheduling and cancelling `command`.
    pub fn toggle_when_deactivated(&mut self, command: SharedCommand) -> &mut Self {
        self.bind(BindingKind::ToggleWhenDeactivated, Action::Schedule(command))
    }

    /// Invoke `callback` on every falling edge (latch inspectable separately).
    pub fn toggle_when_deactivated_call(&mut self, callback: impl FnMut() + 'static) -> &mut Self {
        self.bind(
            BindingKind::ToggleWhenDeactivated,
            Action::Invoke(Box::new(callback)),
        )
    }

    /// Poll the condition once and dispatch any edge transition.
    ///
    /// Called by the scheduler at the start of every tick; hosts driving a
    /// trigger manually may call it directly with the same semantics.
    pub fn poll(&mut self, scheduler: &mut CommandScheduler) {
        let current = (self.condition)();
        let previous = self.previous;
        self.previous = current;
        if current == previous {
            return;
        }
        trace!(
            "trigger `{}`: {} edge",
            self.name,
            if current { "rising" } else { "falling" }
        );
        if current {
            self.on_rising(scheduler);
        } else {
            self.on_falling(scheduler);
        }
    }

    fn on_rising(&mut self, scheduler: &mut CommandScheduler) {
        self.toggle = !self.toggle;
        let toggle_on = self.toggle;
        for binding in &mut self.bindings {
            match binding.kind {
                BindingKind::WhenActivated => fire(&mut binding.action, scheduler),
                BindingKind::WhileActivated => fire(&mut binding.action, scheduler),
                BindingKind::WhileDeactivated => release(&mut binding.action, scheduler),
                BindingKind::ToggleWhenActivated => {
                    flip(&mut binding.action, scheduler, toggle_on)
                }
                BindingKind::WhenDeactivated | BindingKind::ToggleWhenDeactivated => {}
            }
        }
    }

    fn on_falling(&mut self, scheduler: &mut CommandScheduler) {
        self.inverse_toggle = !self.inverse_toggle;
        let toggle_on = self.inverse_toggle;
        for binding in &mut self.bindings {
            match binding.kind {
                BindingKind::WhenDeactivated => fire(&mut binding.action, scheduler),
                BindingKind::WhileDeactivated => fire(&mut binding.action, scheduler),
                BindingKind::WhileActivated => release(&mut binding.action, scheduler),
                BindingKind::ToggleWhenDeactivated => {
                    flip(&mut binding.action, scheduler, toggle_on)
                }
                BindingKind::WhenActivated | BindingKind::ToggleWhenActivated => {}
            }
        }
    }
}

/// Entering side of a binding: schedule the command or run the callback.
fn fire(action: &mut Action, scheduler: &mut CommandScheduler) {
    match action {
        Action::Schedule(command) => scheduler.schedule(command.clone()),
        Action::Invoke(callback) => callback(),
    }
}

/// Leaving side of a while-binding: cancel the command; callbacks idle.
fn release(action: &mut Action, scheduler: &mut CommandScheduler) {
    match action {
        Action::Schedule(command) => scheduler.cancel(command),
        Action::Invoke(_) => {}
    }
}

/// Toggle edge: commands follow the latch, callbacks fire every edge.
fn flip(action: &mut Action, scheduler: &mut CommandScheduler, latch_on: bool) {
    match action {
        Action::Schedule(command) => {
            if latch_on {
                scheduler.schedule(command.clone());
            } else {
                scheduler.cancel(command);
            }
        }
        Action::Invoke(callback) => callback(),
    }
}
