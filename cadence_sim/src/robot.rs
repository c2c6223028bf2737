//! Simulated competition robot: drivebase, lift, and claw.
//!
//! The mechanisms carry toy physics (a pose integrator, a lift that moves
//! a fixed amount per cycle) so the scripted session produces visible
//! state changes without any hardware.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::command::{Command, FnCommand, InstantCommand, shared_command};
use cadence_core::group::SequentialGroup;
use cadence_core::input::{AxisInput, ButtonInput};
use cadence_core::scheduler::{CommandScheduler, SchedulerError};
use cadence_core::subsystem::{Subsystem, shared_subsystem};
use tracing::{debug, trace};

// ─── Mechanisms ─────────────────────────────────────────────────────

const LIFT_TRAVEL: f64 = 30.0;
const LIFT_STEP: f64 = 0.5;
const LIFT_TOLERANCE: f64 = 0.5;
pub const LIFT_HIGH: f64 = 24.0;
pub const LIFT_LOW: f64 = 0.0;

/// Two-motor arcade drivebase with a dead-reckoned pose.
pub struct Drivebase {
    forward_power: f64,
    turn_power: f64,
    x: f64,
    y: f64,
    heading: f64,
}

impl Drivebase {
    fn new() -> Self {
        Self {
            forward_power: 0.0,
            turn_power: 0.0,
            x: 0.0,
            y: 0.0,
            heading: 0.0,
        }
    }

    pub fn set_powers(&mut self, forward: f64, turn: f64) {
        self.forward_power = forward.clamp(-1.0, 1.0);
        self.turn_power = turn.clamp(-1.0, 1.0);
    }

    pub fn stop(&mut self) {
        self.set_powers(0.0, 0.0);
    }

    pub fn pose(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.heading)
    }
}

impl Subsystem for Drivebase {
    fn name(&self) -> &str {
        "drivebase"
    }

    fn periodic(&mut self) {
        self.heading += self.turn_power * 0.05;
        self.x += self.forward_power * self.heading.cos() * 0.1;
        self.y += self.forward_power * self.heading.sin() * 0.1;
        trace!(
            "drivebase pose x={:.2} y={:.2} heading={:.2}",
            self.x, self.y, self.heading
        );
    }
}

/// Linear lift that travels `LIFT_STEP` units per cycle at full power.
pub struct Lift {
    height: f64,
    power: f64,
}

impl Lift {
    fn new() -> Self {
        Self {
            height: 0.0,
            power: 0.0,
        }
    }

    pub fn set_power(&mut self, power: f64) {
        self.power = power.clamp(-1.0, 1.0);
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn at(&self, target: f64) -> bool {
        (self.height - target).abs() <= LIFT_TOLERANCE
    }
}

impl Subsystem for Lift {
    fn name(&self) -> &str {
        "lift"
    }

    fn periodic(&mut self) {
        self.height = (self.height + self.power * LIFT_STEP).clamp(0.0, LIFT_TRAVEL);
    }
}

/// Single-servo claw.
pub struct Claw {
    open: bool,
}

impl Claw {
    fn new() -> Self {
        Self { open: true }
    }

    pub fn set_open(&mut self, open: bool) {
        if self.open != open {
            debug!("claw {}", if open { "open" } else { "closed" });
        }
        self.open = open;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Subsystem for Claw {
    fn name(&self) -> &str {
        "claw"
    }
}

// ─── Commands ───────────────────────────────────────────────────────

/// Default command: follow the sticks, stop on interruption.
fn drive_command(
    drivebase: &Rc<RefCell<Drivebase>>,
    forward: &AxisInput,
    turn: &AxisInput,
) -> FnCommand {
    let (db_exec, db_end) = (drivebase.clone(), drivebase.clone());
    let (forward, turn) = (forward.clone(), turn.clone());
    FnCommand::new("drive")
        .requires(drivebase.clone())
        .on_execute(move || db_exec.borrow_mut().set_powers(forward.get(), turn.get()))
        .runs_forever()
        .on_end(move |_| db_end.borrow_mut().stop())
}

/// Run the lift to `target` and hold position there.
fn lift_to(lift: &Rc<RefCell<Lift>>, name: &'static str, target: f64) -> FnCommand {
    let (lift_exec, lift_done, lift_end) = (lift.clone(), lift.clone(), lift.clone());
    FnCommand::new(name)
        .requires(lift.clone())
        .on_execute(move || {
            let mut lift = lift_exec.borrow_mut();
            let power = if lift.height() < target { 1.0 } else { -1.0 };
            lift.set_power(power);
        })
        .until(move || lift_done.borrow().at(target))
        .on_end(move |_| lift_end.borrow_mut().set_power(0.0))
}

fn claw_command(claw: &Rc<RefCell<Claw>>, name: &'static str, open: bool) -> InstantCommand {
    let claw_action = claw.clone();
    InstantCommand::new(name, move || claw_action.borrow_mut().set_open(open))
        .requires(claw.clone())
}

// ─── Wiring ─────────────────────────────────────────────────────────

/// The wired robot: mechanism handles plus the raw input cells the
/// session script writes into each cycle.
pub struct SimRobot {
    pub drivebase: Rc<RefCell<Drivebase>>,
    pub lift: Rc<RefCell<Lift>>,
    pub claw: Rc<RefCell<Claw>>,
    pub forward_stick: AxisInput,
    pub turn_stick: AxisInput,
    pub button_a: ButtonInput,
    pub button_b: ButtonInput,
    pub button_x: ButtonInput,
    pub button_y: ButtonInput,
}

/// Register the mechanisms, default command, and button bindings.
///
/// Bindings: A opens the claw, B closes it, X sends the lift home,
/// Y runs the pickup sequence (close claw, then lift to scoring height).
pub fn wire(scheduler: &mut CommandScheduler) -> Result<SimRobot, SchedulerError> {
    let drivebase = shared_subsystem(Drivebase::new());
    let lift = shared_subsystem(Lift::new());
    let claw = shared_subsystem(Claw::new());

    scheduler.register_subsystem(drivebase.clone())?;
    scheduler.register_subsystem(lift.clone())?;
    scheduler.register_subsystem(claw.clone())?;

    let forward_stick = AxisInput::new();
    let turn_stick = AxisInput::new();
    let drive = drive_command(&drivebase, &forward_stick, &turn_stick).into_shared();
    scheduler.set_default_command(&drivebase, drive)?;

    let button_a = ButtonInput::new();
    let button_b = ButtonInput::new();
    let button_x = ButtonInput::new();
    let button_y = ButtonInput::new();

    let mut a = button_a.trigger("a");
    a.when_activated(claw_command(&claw, "claw_open", true).into_shared());
    scheduler.register_trigger(a.into_shared());

    let mut b = button_b.trigger("b");
    b.when_activated(claw_command(&claw, "claw_close", false).into_shared());
    scheduler.register_trigger(b.into_shared());

    let mut x = button_x.trigger("x");
    x.when_activated(lift_to(&lift, "lift_home", LIFT_LOW).into_shared());
    scheduler.register_trigger(x.into_shared());

    let pickup_children: Vec<Box<dyn Command>> = vec![
        Box::new(claw_command(&claw, "pickup_grip", false)),
        Box::new(lift_to(&lift, "pickup_raise", LIFT_HIGH)),
    ];
    let pickup = shared_command(SequentialGroup::new("pickup", pickup_children));
    let mut y = button_y.trigger("y");
    y.when_activated(pickup);
    scheduler.register_trigger(y.into_shared());

    Ok(SimRobot {
        drivebase,
        lift,
        claw,
        forward_stick,
        turn_stick,
        button_a,
        button_b,
        button_x,
        button_y,
    })
}

// ─── Session Script ─────────────────────────────────────────────────

/// Write one cycle's worth of scripted driver input.
///
/// Drives forward, arcs, runs the pickup sequence mid-drive, then drops
/// the game piece and sends the lift home.
pub fn script(cycle: u64, robot: &SimRobot) {
    robot
        .forward_stick
        .set(if (20..180).contains(&cycle) { 0.6 } else { 0.0 });
    robot
        .turn_stick
        .set(if (120..180).contains(&cycle) { 0.4 } else { 0.0 });

    robot.button_y.set((60..62).contains(&cycle)); // pickup sequence
    robot.button_a.set((250..252).contains(&cycle)); // drop game piece
    robot.button_x.set((300..302).contains(&cycle)); // lift home
    robot.button_b.set(false);
}

// ─── Tests ──────────────────────────────────────────────────────────
