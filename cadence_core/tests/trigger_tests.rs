//! Trigger dispatch tests through a full scheduler: edge fidelity,
//! while-bindings, and toggle latches.

use std::cell::Cell;
use std::rc::Rc;

use cadence_core::command::{FnCommand, SharedCommand};
use cadence_core::input::ButtonInput;
use cadence_core::scheduler::CommandScheduler;

fn forever(name: &'static str) -> SharedCommand {
    FnCommand::new(name).runs_forever().into_shared()
}

/// Drive the scheduler through the given button sequence, one value per
/// tick, and return whether `observed` was scheduled after each tick.
fn run_sequence(
    scheduler: &mut CommandScheduler,
    button: &ButtonInput,
    sequence: &[bool],
    observed: &SharedCommand,
) -> Vec<bool> {
    let mut active = Vec::with_capacity(sequence.len());
    for &value in sequence {
        button.set(value);
        scheduler.tick();
        active.push(scheduler.is_scheduled(observed));
    }
    active
}

#[test]
fn when_activated_fires_on_rising_edges_only() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let fires = Rc::new(Cell::new(0_u32));
    let f = fires.clone();

    let mut trigger = button.trigger("a");
    trigger.when_activated_call(move || f.set(f.get() + 1));
    scheduler.register_trigger(trigger.into_shared());

    let mut per_cycle = Vec::new();
    for &value in &[false, true, true, false, true] {
        button.set(value);
        scheduler.tick();
        per_cycle.push(fires.get());
    }
    // Fires on cycles 2 and 5 only.
    assert_eq!(per_cycle, vec![0, 1, 1, 1, 2]);
}

#[test]
fn when_deactivated_fires_on_falling_edges_only() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let fires = Rc::new(Cell::new(0_u32));
    let f = fires.clone();

    let mut trigger = button.trigger("b");
    trigger.when_deactivated_call(move || f.set(f.get() + 1));
    scheduler.register_trigger(trigger.into_shared());

    let mut per_cycle = Vec::new();
    for &value in &[false, true, true, false, true] {
        button.set(value);
        scheduler.tick();
        per_cycle.push(fires.get());
    }
    // Fires on cycle 4 only.
    assert_eq!(per_cycle, vec![0, 0, 0, 1, 1]);
}

#[test]
fn while_activated_tracks_the_true_state() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let held = forever("held");

    let mut trigger = button.trigger("x");
    trigger.while_activated(held.clone());
    scheduler.register_trigger(trigger.into_shared());

    let active = run_sequence(
        &mut scheduler,
        &button,
        &[false, true, true, false, true],
        &held,
    );
    // Active during cycles 2-3 and from cycle 5 onward.
    assert_eq!(active, vec![false, true, true, false, true]);
}

#[test]
fn while_deactivated_tracks_the_false_state() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let idle = forever("idle");

    let mut trigger = button.trigger("y");
    trigger.while_deactivated(idle.clone());
    scheduler.register_trigger(trigger.into_shared());

    // The initial false value is not a falling edge; the command first
    // schedules on the first true→false transition.
    let active = run_sequence(
        &mut scheduler,
        &button,
        &[false, true, false, false, true],
        &idle,
    );
    assert_eq!(active, vec![false, false, true, true, false]);
}

#[test]
fn while_binding_is_continuous_not_retriggered() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let inits = Rc::new(Cell::new(0_u32));
    let i = inits.clone();
    let held = FnCommand::new("held")
        .on_init(move || i.set(i.get() + 1))
        .runs_forever()
        .into_shared();

    let mut trigger = button.trigger("z");
    trigger.while_activated(held.clone());
    scheduler.register_trigger(trigger.into_shared());

    for _ in 0..5 {
        button.set(true);
        scheduler.tick();
    }
    // One schedule on the rising edge, not one per true cycle.
    assert_eq!(inits.get(), 1);
}

#[test]
fn toggle_when_activated_alternates_schedule_and_cancel() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let latched = forever("latched");

    let mut trigger = button.trigger("toggle");
    trigger.toggle_when_activated(latched.clone());
    scheduler.register_trigger(trigger.into_shared());

    // Three rising edges separated by releases.
    let active = run_sequence(
        &mut scheduler,
        &button,
        &[true, false, true, false, true],
        &latched,
    );
    // Edge 1 schedules, edge 2 cancels, edge 3 reschedules.
    assert_eq!(active, vec![true, true, false, false, true]);
}

#[test]
fn toggle_latch_is_shared_by_bindings_and_inspectable() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let first = forever("first");
    let second = forever("second");

    let trigger = button.trigger("shared").into_shared();
    trigger
        .borrow_mut()
        .toggle_when_activated(first.clone())
        .toggle_when_activated(second.clone());
    scheduler.register_trigger(trigger.clone());

    button.set(true);
    scheduler.tick();
    assert!(trigger.borrow().toggle_state());
    assert!(scheduler.is_scheduled(&first));
    assert!(scheduler.is_scheduled(&second));

    button.set(false);
    scheduler.tick();
    button.set(true);
    scheduler.tick();
    // Both bindings observed the same latch flip.
    assert!(!trigger.borrow().toggle_state());
    assert!(!scheduler.is_scheduled(&first));
    assert!(!scheduler.is_scheduled(&second));
}

#[test]
fn toggle_when_deactivated_uses_the_inverse_latch() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let latched = forever("latched");

    let trigger = button.trigger("inverse").into_shared();
    trigger.borrow_mut().toggle_when_deactivated(latched.clone());
    scheduler.register_trigger(trigger.clone());

    // Falling edges at cycles 3 and 5.
    for &value in &[false, true, false, true, false] {
        button.set(value);
        scheduler.tick();
    }
    assert!(!trigger.borrow().inverse_toggle_state());
    assert!(!scheduler.is_scheduled(&latched));
    // The rising-side latch moved independently (two rising edges).
    assert!(!trigger.borrow().toggle_state());

    button.set(true);
    scheduler.tick();
    button.set(false);
    scheduler.tick();
    assert!(trigger.borrow().inverse_toggle_state());
    assert!(scheduler.is_scheduled(&latched));
}

#[test]
fn bindings_can_be_added_between_polls() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let late = forever("late");

    let trigger = button.trigger("grows").into_shared();
    scheduler.register_trigger(trigger.clone());

    button.set(true);
    scheduler.tick(); // rising edge with no bindings: no-op
    assert!(!scheduler.is_scheduled(&late));

    trigger.borrow_mut().when_activated(late.clone());
    button.set(false);
    scheduler.tick();
    button.set(true);
    scheduler.tick(); // next rising edge fires the new binding
    assert!(scheduler.is_scheduled(&late));
}

#[test]
fn one_trigger_carries_combined_bindings() {
    let mut scheduler = CommandScheduler::new();
    let button = ButtonInput::new();
    let rises = Rc::new(Cell::new(0_u32));
    let falls = Rc::new(Cell::new(0_u32));
    let (r, f) = (rises.clone(), falls.clone());
    let held = forever("held");
    let latched = forever("latched");

    let trigger = button.trigger("combined").into_shared();
    trigger
        .borrow_mut()
        .when_activated_call(move || r.set(r.get() + 1))
        .when_deactivated_call(move || f.set(f.get() + 1))
        .while_activated(held.clone())
        .toggle_when_activated(latched.clone());
    scheduler.register_trigger(trigger);

    for &value in &[true, false, true, false] {
        button.set(value);
        scheduler.tick();
    }
    assert_eq!(rises.get(), 2);
    assert_eq!(falls.get(), 2);
    assert!(!scheduler.is_scheduled(&held)); // released on the last falling edge
    assert!(!scheduler.is_scheduled(&latched)); // toggled off by the 2nd rise
}
