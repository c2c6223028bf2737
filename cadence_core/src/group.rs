//! Command compositions: sequences, parallels, races, conditionals.
//!
//! Groups are ordinary commands that drive their children internally, so
//! the scheduler sees one lifecycle and one requirement set (the
//! deduplicated union of the children's). A group admitted by the scheduler
//! therefore claims every subsystem any child will touch, for the whole
//! group run.
//!
//! Children live inside the group as `Box<dyn Command>`; they are not
//! independently schedulable while the group owns them.

use crate::command::{Command, CommandError, HookResult};
use crate::subsystem::{SharedSubsystem, SubsystemKey};

/// Deduplicated union of the children's requirement sets.
fn union_requirements(children: &[Box<dyn Command>]) -> Vec<SharedSubsystem> {
    let mut union: Vec<SharedSubsystem> = Vec::new();
    for child in children {
        for subsystem in child.requirements() {
            let key = SubsystemKey::of(subsystem);
            if !union.iter().any(|s| SubsystemKey::of(s) == key) {
                union.push(subsystem.clone());
            }
        }
    }
    union
}

// ─── Sequential ─────────────────────────────────────────────────────

/// Runs its children one after another, in order.
///
/// Each child gets its full lifecycle (`init` → `execute`/`is_finished` →
/// `end(false)`) inside the group's `execute` ticks; the group finishes
/// when the last child does. Interrupting the group interrupts the child
/// that is currently active.
pub struct SequentialGroup {
    name: String,
    children: Vec<Box<dyn Command>>,
    requirements: Vec<SharedSubsystem>,
    index: usize,
    child_started: bool,
    done: bool,
}

impl SequentialGroup {
    /// Build a sequence from the given children (run in vec order).
    pub fn new(name: impl Into<String>, children: Vec<Box<dyn Command>>) -> Self {
        let requirements = union_requirements(&children);
        Self {
            name: name.into(),
            children,
            requirements,
            index: 0,
            child_started: false,
            done: false,
        }
    }
}

impl Command for SequentialGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[SharedSubsystem] {
        &self.requirements
    }

    fn init(&mut self) -> HookResult {
        self.index = 0;
        self.child_started = false;
        self.done = self.children.is_empty();
        Ok(())
    }

    fn execute(&mut self) -> HookResult {
        if self.done {
            return Ok(());
        }
        let child = &mut self.children[self.index];
        if !self.child_started {
            child.init()?;
            self.child_started = true;
        }
        child.execute()?;
        if child.is_finished()? {
            child.end(false)?;
            self.child_started = false;
            self.index += 1;
            if self.index == self.children.len() {
                self.done = true;
            }
        }
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool, CommandError> {
        Ok(self.done)
    }

    fn end(&mut self, interrupted: bool) -> HookResult {
        if interrupted && self.child_started && !self.done {
            self.children[self.index].end(true)?;
            self.child_started = false;
        }
        Ok(())
    }
}

// ─── Parallel ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildStage {
    Pending,
    Active,
    Done,
}

struct ParallelChild {
    command: Box<dyn Command>,
    stage: ChildStage,
}

/// Runs all children simultaneously until every one has finished.
pub struct ParallelGroup {
    name: String,
    children: Vec<ParallelChild>,
    requirements: Vec<SharedSubsystem>,
}

impl ParallelGroup {
    /// Build a parallel group from the given children.
    pub fn new(name: impl Into<String>, children: Vec<Box<dyn Command>>) -> Self {
        let requirements = union_requirements(&children);
        let children = children
            .into_iter()
            .map(|command| ParallelChild {
                command,
                stage: ChildStage::Pending,
            })
            .collect();
        Self {
            name: name.into(),
            children,
            requirements,
        }
    }

    fn advance_children(&mut self) -> HookResult {
        for child in &mut self.children {
            if child.stage != ChildStage::Active {
                continue;
            }
            child.command.execute()?;
            if child.command.is_finished()? {
                child.command.end(false)?;
                child.stage = ChildStage::Done;
            }
        }
        Ok(())
    }

    fn interrupt_active_children(&mut self) -> HookResult {
        for child in &mut self.children {
            if child.stage == ChildStage::Active {
                child.command.end(true)?;
                child.stage = ChildStage::Done;
            }
        }
        Ok(())
    }
}

impl Command for ParallelGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[SharedSubsystem] {
        &self.requirements
    }

    fn init(&mut self) -> HookResult {
        for child in &mut self.children {
            child.command.init()?;
            child.stage = ChildStage::Active;
        }
        Ok(())
    }

    fn execute(&mut self) -> HookResult {
        self.advance_children()
    }

    fn is_finished(&mut self) -> Result<bool, CommandError> {
        Ok(self.children.iter().all(|c| c.stage == ChildStage::Done))
    }

    fn end(&mut self, interrupted: bool) -> HookResult {
        if interrupted {
            self.interrupt_active_children()?;
        }
        Ok(())
    }
}

/// Runs all children simultaneously until the first one finishes.
///
/// The winner ends naturally; every other still-active child is ended as
/// interrupted when the group ends, whichever way the group ends.
pub struct ParallelRaceGroup {
    inner: ParallelGroup,
}

impl ParallelRaceGroup {
    /// Build a race from the given children.
    pub fn new(name: impl Into<String>, children: Vec<Box<dyn Command>>) -> Self {
        Self {
            inner: ParallelGroup::new(name, children),
        }
    }
}

impl Command for ParallelRaceGroup {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn requirements(&self) -> &[SharedSubsystem] {
        self.inner.requirements()
    }

    fn init(&mut self) -> HookResult {
        self.inner.init()
    }

    fn execute(&mut self) -> HookResult {
        self.inner.advance_children()
    }

    fn is_finished(&mut self) -> Result<bool, CommandError> {
        Ok(self
            .inner
            .children
            .iter()
            .any(|c| c.stage == ChildStage::Done))
    }

    fn end(&mut self, _interrupted: bool) -> HookResult {
        // Losers are cut off even on a natural group finish.
        self.inner.interrupt_active_children()
    }
}

// ─── Conditional ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Undecided,
    True,
    False,
}

/// Runs one of two children depending on a condition.
///
/// With only a true-branch, the command idles until the condition first
/// reads `true`, then runs that child — the "wait until, then do" building
/// block for sequences.
///
/// With both branches, the branch is chosen on the first `execute` from the
/// condition's value at that moment.
pub struct ConditionalCommand {
    name: String,
    condition: Box<dyn FnMut() -> bool>,
    on_true: Box<dyn Command>,
    on_false: Option<Box<dyn Command>>,
    requirements: Vec<SharedSubsystem>,
    branch: Branch,
    child_started: bool,
    done: bool,
}

impl ConditionalCommand {
    /// One-branch form: wait for the condition, then run `on_true`.
    pub fn new(
        name: impl Into<String>,
        condition: impl FnMut() -> bool + 'static,
        on_true: Box<dyn Command>,
    ) -> Self {
        let requirements = union_requirements(std::slice::from_ref(&on_true));
        Self {
            name: name.into(),
            condition: Box::new(condition),
            on_true,
            on_false: None,
            requirements,
            branch: Branch::Undecided,
            child_started: false,
            done: false,
        }
    }

    /// Two-branch form: pick a branch immediately from the condition.
    pub fn with_else(
        name: impl Into<String>,
        condition: impl FnMut() -> bool + 'static,
        on_true: Box<dyn Command>,
        on_false: Box<dyn Command>,
    ) -> Self {
        let mut requirements = union_requirements(std::slice::from_ref(&on_true));
        for subsystem in on_false.requirements() {
            let key = SubsystemKey::of(subsystem);
            if !requirements.iter().any(|s| SubsystemKey::of(s) == key) {
                requirements.push(subsystem.clone());
            }
        }
        Self {
            name: name.into(),
            condition: Box::new(condition),
            on_true,
            on_false: Some(on_false),
            requirements,
            branch: Branch::Undecided,
            child_started: false,
            done: false,
        }
    }

    fn active_child(&mut self) -> Option<&mut Box<dyn Command>> {
        match self.branch {
            Branch::True => Some(&mut self.on_true),
            Branch::False => self.on_false.as_mut(),
            Branch::Undecided => None,
        }
    }
}

impl Command for ConditionalCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[SharedSubsystem] {
        &self.requirements
    }

    fn init(&mut self) -> HookResult {
        self.branch = Branch::Undecided;
        self.child_started = false;
        self.done = false;
        Ok(())
    }

    fn execute(&mut self) -> HookResult {
        if self.done {
            return Ok(());
        }
        if self.branch == Branch::Undecided {
            if (self.condition)() {
                self.branch = Branch::True;
            } else if self.on_false.is_some() {
                self.branch = Branch::False;
            } else {
                // One-branch form: keep waiting for the condition.
                return Ok(());
            }
        }
        if !self.child_started {
            match self.active_child() {
                Some(child) => child.init()?,
                None => {
                    self.done = true;
                    return Ok(());
                }
            }
            self.child_started = true;
        }
        let child = match self.active_child() {
            Some(child) => child,
            None => return Ok(()),
        };
        child.execute()?;
        if child.is_finished()? {
            child.end(false)?;
            self.child_started = false;
            self.done = true;
        }
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool, CommandError> {
        Ok(self.done)
    }

    fn end(&mut self, interrupted: bool) -> HookResult {
        if interrupted && self.child_started && !self.done {
            if let Some(child) = self.active_child() {
                child.end(true)?;
            }
            self.child_started = false;
        }
        Ok(())
    }
}
