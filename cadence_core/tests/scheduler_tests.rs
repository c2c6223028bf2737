//! Scheduler behavior tests: admission, claims, interruption, defaults,
//! fault confinement, and tick ordering.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::command::{CommandError, CommandState, FnCommand, SharedCommand};
use cadence_core::scheduler::{CommandScheduler, SchedulerError, TickEvents};
use cadence_core::subsystem::{Subsystem, shared_subsystem};

// ─── Helpers ────────────────────────────────────────────────────────

struct Mech {
    name: &'static str,
    periodics: u32,
}

impl Subsystem for Mech {
    fn name(&self) -> &str {
        self.name
    }

    fn periodic(&mut self) {
        self.periodics += 1;
    }
}

fn mech(name: &'static str) -> Rc<RefCell<Mech>> {
    shared_subsystem(Mech { name, periodics: 0 })
}

/// Records every hook invocation of one command.
#[derive(Default)]
struct HookLog {
    inits: u32,
    execs: u32,
    ends: Vec<bool>,
}

type SharedHookLog = Rc<RefCell<HookLog>>;

fn logged(name: &'static str, hooks: &SharedHookLog) -> FnCommand {
    let (p1, p2, p3) = (hooks.clone(), hooks.clone(), hooks.clone());
    FnCommand::new(name)
        .on_init(move || p1.borrow_mut().inits += 1)
        .on_execute(move || p2.borrow_mut().execs += 1)
        .on_end(move |interrupted| p3.borrow_mut().ends.push(interrupted))
}

// ─── Admission & Lifecycle ──────────────────────────────────────────

#[test]
fn command_lifecycle_init_execute_finish() {
    let mut scheduler = CommandScheduler::new();
    let hooks = SharedHookLog::default();
    let cmd = logged("one_shot", &hooks).into_shared();

    scheduler.schedule(cmd.clone());
    assert_eq!(scheduler.state_of(&cmd), CommandState::Idle); // pending, not admitted

    scheduler.tick(); // admission: init only
    assert_eq!(scheduler.state_of(&cmd), CommandState::Running);
    assert_eq!(hooks.borrow().inits, 1);
    assert_eq!(hooks.borrow().execs, 0);

    scheduler.tick(); // execute, finishes, end(false)
    assert_eq!(scheduler.state_of(&cmd), CommandState::Idle);
    let p = hooks.borrow();
    assert_eq!(p.execs, 1);
    assert_eq!(p.ends, vec![false]);
}

#[test]
fn hookless_one_shot_retires_cleanly() {
    let mut scheduler = CommandScheduler::new();
    let cmd = FnCommand::new("one_shot").into_shared();

    scheduler.schedule(cmd.clone());
    scheduler.tick(); // admitted
    scheduler.tick(); // executes once, finishes, ends

    assert_eq!(scheduler.state_of(&cmd), CommandState::Idle);
    assert_eq!(scheduler.stats().commands_finished, 1);
    assert_eq!(scheduler.stats().hook_faults, 0);
}

#[test]
fn running_commands_advance_before_new_admissions_init() {
    let mut scheduler = CommandScheduler::new();
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let l1 = log.clone();
    let old = FnCommand::new("old")
        .on_execute(move || l1.borrow_mut().push("old-execute"))
        .runs_forever()
        .into_shared();
    let l2 = log.clone();
    let new = FnCommand::new("new")
        .on_init(move || l2.borrow_mut().push("new-init"))
        .runs_forever()
        .into_shared();

    scheduler.schedule(old.clone());
    scheduler.tick();
    log.borrow_mut().clear();

    scheduler.schedule(new.clone());
    scheduler.tick();
    assert_eq!(*log.borrow(), vec!["old-execute", "new-init"]);
}

#[test]
fn scheduling_a_running_command_is_a_noop() {
    let mut scheduler = CommandScheduler::new();
    let hooks = SharedHookLog::default();
    let cmd = logged("hold", &hooks).runs_forever().into_shared();

    scheduler.schedule(cmd.clone());
    scheduler.tick();
    scheduler.schedule(cmd.clone());
    scheduler.schedule(cmd.clone());
    scheduler.tick();
    assert_eq!(hooks.borrow().inits, 1);
    assert_eq!(scheduler.stats().commands_scheduled, 1);
}

#[test]
fn commands_without_requirements_run_alongside_anything() {
    let mut scheduler = CommandScheduler::new();
    let a = FnCommand::new("a").runs_forever().into_shared();
    let b = FnCommand::new("b").runs_forever().into_shared();

    scheduler.schedule(a.clone());
    scheduler.schedule(b.clone());
    scheduler.tick();
    assert!(scheduler.is_scheduled(&a));
    assert!(scheduler.is_scheduled(&b));
}

#[test]
fn requirement_on_unregistered_subsystem_rejects_request() {
    let mut scheduler = CommandScheduler::new();
    let stray = mech("stray");
    let cmd = FnCommand::new("lost")
        .requires(stray.clone())
        .runs_forever()
        .into_shared();

    scheduler.schedule(cmd.clone());
    scheduler.tick();
    assert!(!scheduler.is_scheduled(&cmd));
    assert_eq!(scheduler.stats().admissions_rejected, 1);
}

// ─── Mutual Exclusion & Interruption ────────────────────────────────

#[test]
fn subsystem_is_never_claimed_by_two_commands() {
    let mut scheduler = CommandScheduler::new();
    let arm = mech("arm");
    scheduler.register_subsystem(arm.clone()).unwrap();

    let hooks_a = SharedHookLog::default();
    let a = logged("a", &hooks_a)
        .requires(arm.clone())
        .runs_forever()
        .into_shared();
    let b = FnCommand::new("b")
        .requires(arm.clone())
        .runs_forever()
        .into_shared();

    scheduler.schedule(a.clone());
    scheduler.tick();
    assert!(Rc::ptr_eq(&scheduler.current_claim(&arm).unwrap(), &a));

    scheduler.schedule(b.clone());
    scheduler.tick();
    // a preempted, b holds the claim; never both.
    assert!(!scheduler.is_scheduled(&a));
    assert!(Rc::ptr_eq(&scheduler.current_claim(&arm).unwrap(), &b));
    assert_eq!(hooks_a.borrow().ends, vec![true]);
}

#[test]
fn preempted_command_gets_exactly_one_end_true() {
    let mut scheduler = CommandScheduler::new();
    let arm = mech("arm");
    scheduler.register_subsystem(arm.clone()).unwrap();

    let hooks = SharedHookLog::default();
    let holder = logged("holder", &hooks)
        .requires(arm.clone())
        .runs_forever()
        .into_shared();
    let usurper = FnCommand::new("usurper")
        .requires(arm.clone())
        .runs_forever()
        .into_shared();

    scheduler.schedule(holder.clone());
    scheduler.tick();
    scheduler.schedule(usurper.clone());
    scheduler.tick();
    scheduler.tick();
    scheduler.tick();
    assert_eq!(hooks.borrow().ends, vec![true]);
}

#[test]
fn non_interruptible_holder_rejects_conflicting_admission() {
    let mut scheduler = CommandScheduler::new();
    let arm = mech("arm");
    scheduler.register_subsystem(arm.clone()).unwrap();

    let hooks = SharedHookLog::default();
    let holder = logged("holder", &hooks)
        .requires(arm.clone())
        .uninterruptible()
        .runs_forever()
        .into_shared();
    let challenger = FnCommand::new("challenger")
        .requires(arm.clone())
        .runs_forever()
        .into_shared();

    scheduler.schedule(holder.clone());
    scheduler.tick();
    scheduler.schedule(challenger.clone());
    scheduler.tick();

    // Holder untouched, challenger never admitted.
    assert!(scheduler.is_scheduled(&holder));
    assert!(!scheduler.is_scheduled(&challenger));
    assert!(Rc::ptr_eq(&scheduler.current_claim(&arm).unwrap(), &holder));
    assert!(hooks.borrow().ends.is_empty());
    assert_eq!(scheduler.stats().admissions_rejected, 1);
    assert!(
        scheduler
            .stats()
            .last_tick_events
            .contains(TickEvents::REJECTED)
    );
}

#[test]
fn multi_requirement_conflict_takes_no_partial_claim() {
    let mut scheduler = CommandScheduler::new();
    let arm = mech("arm");
    let lift = mech("lift");
    scheduler.register_subsystem(arm.clone()).unwrap();
    scheduler.register_subsystem(lift.clone()).unwrap();

    let blocker = FnCommand::new("blocker")
        .requires(lift.clone())
        .uninterruptible()
        .runs_forever()
        .into_shared();
    let wide = FnCommand::new("wide")
        .requires(arm.clone())
        .requires(lift.clone())
        .runs_forever()
        .into_shared();

    scheduler.schedule(blocker.clone());
    scheduler.tick();
    scheduler.schedule(wide.clone());
    scheduler.tick();

    assert!(!scheduler.is_scheduled(&wide));
    // The free subsystem stayed free: no partial claim was taken.
    assert!(scheduler.current_claim(&arm).is_none());
}

#[test]
fn cancel_overrides_non_interruptible() {
    let mut scheduler = CommandScheduler::new();
    let hooks = SharedHookLog::default();
    let stubborn = logged("stubborn", &hooks)
        .uninterruptible()
        .runs_forever()
        .into_shared();

    scheduler.schedule(stubborn.clone());
    scheduler.tick();
    assert!(scheduler.is_scheduled(&stubborn));

    scheduler.cancel(&stubborn);
    assert!(!scheduler.is_scheduled(&stubborn));
    assert_eq!(hooks.borrow().ends, vec![true]);
}

#[test]
fn cancel_drops_a_pending_request() {
    let mut scheduler = CommandScheduler::new();
    let hooks = SharedHookLog::default();
    let cmd = logged("queued", &hooks).runs_forever().into_shared();

    scheduler.schedule(cmd.clone());
    scheduler.cancel(&cmd);
    scheduler.tick();
    assert!(!scheduler.is_scheduled(&cmd));
    assert_eq!(hooks.borrow().inits, 0);
}

// ─── Default Commands ───────────────────────────────────────────────

#[test]
fn default_command_fills_unclaimed_subsystem() {
    let mut scheduler = CommandScheduler::new();
    let drive = mech("drive");
    scheduler.register_subsystem(drive.clone()).unwrap();

    let default_hooks = SharedHookLog::default();
    let idle = logged("idle", &default_hooks)
        .requires(drive.clone())
        .runs_forever()
        .into_shared();
    scheduler.set_default_command(&drive, idle.clone()).unwrap();

    scheduler.tick();
    assert!(Rc::ptr_eq(&scheduler.current_claim(&drive).unwrap(), &idle));
    assert!(
        scheduler
            .stats()
            .last_tick_events
            .contains(TickEvents::DEFAULT_SCHEDULED)
    );
}

#[test]
fn default_command_returns_after_claim_released() {
    let mut scheduler = CommandScheduler::new();
    let drive = mech("drive");
    scheduler.register_subsystem(drive.clone()).unwrap();

    let default_hooks = SharedHookLog::default();
    let idle = logged("idle", &default_hooks)
        .requires(drive.clone())
        .runs_forever()
        .into_shared();
    scheduler.set_default_command(&drive, idle.clone()).unwrap();

    let burst = FnCommand::new("burst")
        .requires(drive.clone())
        .into_shared(); // finishes on first execute

    scheduler.tick(); // default admitted
    scheduler.schedule(burst.clone());
    scheduler.tick(); // default preempted, burst admitted
    assert!(Rc::ptr_eq(&scheduler.current_claim(&drive).unwrap(), &burst));
    assert_eq!(default_hooks.borrow().ends, vec![true]);

    scheduler.tick(); // burst finishes; default re-admitted same tick
    assert!(Rc::ptr_eq(&scheduler.current_claim(&drive).unwrap(), &idle));
    assert_eq!(default_hooks.borrow().inits, 2);
}

#[test]
fn default_command_must_require_its_subsystem() {
    let mut scheduler = CommandScheduler::new();
    let drive = mech("drive");
    let lift = mech("lift");
    scheduler.register_subsystem(drive.clone()).unwrap();
    scheduler.register_subsystem(lift.clone()).unwrap();

    let wrong = FnCommand::new("wrong")
        .requires(lift.clone())
        .runs_forever()
        .into_shared();
    let result = scheduler.set_default_command(&drive, wrong);
    assert!(matches!(
        result,
        Err(SchedulerError::DefaultNotRequiring { .. })
    ));
}

#[test]
fn default_command_on_unregistered_subsystem_is_an_error() {
    let mut scheduler = CommandScheduler::new();
    let ghost = mech("ghost");
    let cmd = FnCommand::new("cmd")
        .requires(ghost.clone())
        .runs_forever()
        .into_shared();
    assert!(matches!(
        scheduler.set_default_command(&ghost, cmd),
        Err(SchedulerError::UnregisteredSubsystem { .. })
    ));
}

// ─── Registry ───────────────────────────────────────────────────────

#[test]
fn double_registration_is_an_error() {
    let mut scheduler = CommandScheduler::new();
    let drive = mech("drive");
    scheduler.register_subsystem(drive.clone()).unwrap();
    assert!(matches!(
        scheduler.register_subsystem(drive.clone()),
        Err(SchedulerError::AlreadyRegistered { .. })
    ));
}

#[test]
fn periodic_runs_once_per_tick_claimed_or_not() {
    let mut scheduler = CommandScheduler::new();
    let drive = mech("drive");
    scheduler.register_subsystem(drive.clone()).unwrap();

    scheduler.tick();
    scheduler.tick();
    assert_eq!(drive.borrow().periodics, 2);

    let hold = FnCommand::new("hold")
        .requires(drive.clone())
        .runs_forever()
        .into_shared();
    scheduler.schedule(hold);
    scheduler.tick();
    assert_eq!(drive.borrow().periodics, 3);
}

// ─── Fault Confinement ──────────────────────────────────────────────

#[test]
fn hook_fault_ends_command_without_stopping_the_tick() {
    let mut scheduler = CommandScheduler::new();
    let arm = mech("arm");
    scheduler.register_subsystem(arm.clone()).unwrap();

    let hooks = SharedHookLog::default();
    let p = hooks.clone();
    let faulty = FnCommand::new("faulty")
        .requires(arm.clone())
        .try_execute(|| Err(CommandError::new("encoder unplugged")))
        .on_end(move |interrupted| p.borrow_mut().ends.push(interrupted))
        .into_shared();
    let bystander_hooks = SharedHookLog::default();
    let bystander = logged("bystander", &bystander_hooks)
        .runs_forever()
        .into_shared();

    scheduler.schedule(faulty.clone());
    scheduler.schedule(bystander.clone());
    scheduler.tick(); // both admitted
    scheduler.tick(); // faulty faults, bystander keeps running

    assert!(!scheduler.is_scheduled(&faulty));
    assert_eq!(hooks.borrow().ends, vec![true]);
    assert!(scheduler.current_claim(&arm).is_none());
    assert!(scheduler.is_scheduled(&bystander));
    assert_eq!(bystander_hooks.borrow().execs, 1);
    assert_eq!(scheduler.stats().hook_faults, 1);
    assert!(
        scheduler
            .stats()
            .last_tick_events
            .contains(TickEvents::HOOK_FAULT)
    );
}

#[test]
fn init_fault_releases_fresh_claims() {
    let mut scheduler = CommandScheduler::new();
    let arm = mech("arm");
    scheduler.register_subsystem(arm.clone()).unwrap();

    let doomed = FnCommand::new("doomed")
        .requires(arm.clone())
        .try_init(|| Err(CommandError::new("no homing reference")))
        .runs_forever()
        .into_shared();

    scheduler.schedule(doomed.clone());
    scheduler.tick();
    assert!(!scheduler.is_scheduled(&doomed));
    assert!(scheduler.current_claim(&arm).is_none());
}

#[test]
fn finish_check_fault_ends_the_command() {
    let mut scheduler = CommandScheduler::new();
    let hooks = SharedHookLog::default();
    let p = hooks.clone();
    let flaky = FnCommand::new("flaky")
        .try_until(|| Err(CommandError::new("limit switch open circuit")))
        .on_end(move |interrupted| p.borrow_mut().ends.push(interrupted))
        .into_shared();

    scheduler.schedule(flaky.clone());
    scheduler.tick(); // admitted
    scheduler.tick(); // execute runs, finish check faults

    assert!(!scheduler.is_scheduled(&flaky));
    assert_eq!(hooks.borrow().ends, vec![true]);
    assert_eq!(scheduler.stats().hook_faults, 1);
    assert_eq!(scheduler.stats().commands_finished, 0);
}

// ─── Reset & Re-submission ──────────────────────────────────────────

#[test]
fn reset_interrupts_everything_and_keeps_registrations() {
    let mut scheduler = CommandScheduler::new();
    let drive = mech("drive");
    scheduler.register_subsystem(drive.clone()).unwrap();

    let idle = FnCommand::new("idle")
        .requires(drive.clone())
        .runs_forever()
        .into_shared();
    scheduler.set_default_command(&drive, idle.clone()).unwrap();

    let hooks = SharedHookLog::default();
    let running = logged("running", &hooks).runs_forever().into_shared();
    let queued: SharedCommand = FnCommand::new("queued").runs_forever().into_shared();

    scheduler.schedule(running.clone());
    scheduler.tick();
    scheduler.schedule(queued.clone());
    scheduler.reset();

    assert!(!scheduler.is_scheduled(&running));
    assert_eq!(hooks.borrow().ends, vec![true]);
    assert!(scheduler.current_claim(&drive).is_none());

    // Registrations survive: the next tick re-admits the default.
    scheduler.tick();
    assert!(!scheduler.is_scheduled(&queued));
    assert!(Rc::ptr_eq(&scheduler.current_claim(&drive).unwrap(), &idle));
}

#[test]
fn ended_command_can_be_resubmitted_fresh() {
    let mut scheduler = CommandScheduler::new();
    let hooks = SharedHookLog::default();
    let cmd = logged("again", &hooks).into_shared();

    scheduler.schedule(cmd.clone());
    scheduler.tick();
    scheduler.tick(); // finishes
    scheduler.schedule(cmd.clone());
    scheduler.tick();
    scheduler.tick(); // finishes again

    let p = hooks.borrow();
    assert_eq!(p.inits, 2);
    assert_eq!(p.ends, vec![false, false]);
}

#[test]
fn stats_count_the_session() {
    let mut scheduler = CommandScheduler::new();
    let one = FnCommand::new("one").into_shared();
    scheduler.schedule(one);
    scheduler.tick();
    scheduler.tick();

    let stats = scheduler.stats();
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.commands_scheduled, 1);
    assert_eq!(stats.commands_finished, 1);
    assert_eq!(stats.commands_interrupted, 0);
}
