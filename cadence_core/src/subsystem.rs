//! Subsystems — the unit of mutual exclusion.
//!
//! A subsystem wraps a group of hardware device handles (opaque to the
//! scheduler) and exposes a [`Subsystem::periodic`] hook that the scheduler
//! invokes exactly once per tick, claimed or not.
//!
//! Subsystems are shared as `Rc<RefCell<_>>` handles; identity is the
//! reference identity of the handle's allocation ([`SubsystemKey`]), never
//! the name or any field value.

use std::cell::RefCell;
use std::rc::Rc;

/// A robot subsystem: owns its device handles, acts as the claim unit.
///
/// Implementors keep their hardware handles as ordinary struct fields;
/// the scheduler never looks at them. `periodic` is the place for sensor
/// caching and continuous safety checks and must return well within the
/// cycle budget.
pub trait Subsystem {
    /// Stable human-readable name, used for logging and error messages.
    fn name(&self) -> &str;

    /// Invoked exactly once per tick, regardless of the current claim.
    fn periodic(&mut self) {}
}

/// Shared handle to a registered subsystem.
pub type SharedSubsystem = Rc<RefCell<dyn Subsystem>>;

/// Identity key of a subsystem handle.
///
/// The key is the thin data pointer of the `Rc` allocation, so two clones
/// of the same handle compare equal and two distinct subsystems never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubsystemKey(*const ());

impl SubsystemKey {
    /// Key of the given handle. Accepts concrete and `dyn` handles alike.
    pub fn of<S: Subsystem + ?Sized>(subsystem: &Rc<RefCell<S>>) -> Self {
        Self(Rc::as_ptr(subsystem).cast::<()>())
    }
}

/// Wrap a concrete subsystem into a shareable handle.
pub fn shared_subsystem<S: Subsystem + 'static>(subsystem: S) -> Rc<RefCell<S>> {
    Rc::new(RefCell::new(subsystem))
}
