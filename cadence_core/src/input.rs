//! Raw input cells — host-fed boolean and axis values.
//!
//! The host integration layer decodes its gamepads and sensors elsewhere
//! and writes raw values into these shared cells before each tick; triggers
//! built from a cell read it during the poll phase. Decoding beyond raw
//! boolean/axis values stays outside the core.

use std::cell::Cell;
use std::rc::Rc;

use crate::trigger::Trigger;

/// A host-updated boolean input (a button, a beam-break sensor).
///
/// Cloning shares the underlying cell.
#[derive(Clone, Default)]
pub struct ButtonInput {
    state: Rc<Cell<bool>>,
}

impl ButtonInput {
    /// New input, initially released.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host-side write, once per control cycle.
    pub fn set(&self, pressed: bool) {
        self.state.set(pressed);
    }

    /// Current raw value.
    pub fn get(&self) -> bool {
        self.state.get()
    }

    /// Build a trigger polling this input.
    pub fn trigger(&self, name: impl Into<String>) -> Trigger {
        let state = self.state.clone();
        Trigger::new(name, move || state.get())
    }
}

/// A host-updated analog input (a stick axis, an analog trigger).
///
/// Cloning shares the underlying cell.
#[derive(Clone, Default)]
pub struct AxisInput {
    value: Rc<Cell<f64>>,
}

impl AxisInput {
    /// New input, initially 0.0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host-side write, once per control cycle.
    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    /// Current raw value.
    pub fn get(&self) -> f64 {
        self.value.get()
    }

    /// Trigger that reads true while the axis exceeds `threshold`.
    pub fn trigger_above(&self, name: impl Into<String>, threshold: f64) -> Trigger {
        let value = self.value.clone();
        Trigger::new(name, move || value.get() > threshold)
    }

    /// Trigger that reads true while the axis is below `threshold`.
    pub fn trigger_below(&self, name: impl Into<String>, threshold: f64) -> Trigger {
        let value = self.value.clone();
        Trigger::new(name, move || value.get() < threshold)
    }
}
