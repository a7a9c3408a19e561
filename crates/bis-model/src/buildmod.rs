//! Build-modification value types.
//!
//! A build modification is a named, reversible patch inside a step. Each step
//! that references the patch records whether it is applied or removed there.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a build modification is in force at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildModAction {
    Apply,
    Remove,
}

impl fmt::Display for BuildModAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Apply => "APPLY",
            Self::Remove => "REMOVE",
        })
    }
}

/// Fallback used when no action is recorded at the requested step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionPolicy {
    /// Exact step only.
    #[default]
    Current,
    /// Most recently recorded step, wherever it is.
    Last,
    /// Nearest recorded step at or before the request.
    Previous,
    /// Nearest recorded step at or after the request.
    Next,
    /// Like `Previous`, but a request before the first recorded step
    /// resolves to `Remove`: the patch has not happened yet.
    Future,
}

/// Slots of the build-mod attribute vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildModAttribute {
    BeginLine = 0,
    ActionLine = 1,
    EndLine = 2,
    DisplayPage = 3,
    StepPieces = 4,
    ModelIndex = 5,
    ModelLine = 6,
    ModelStep = 7,
}

impl BuildModAttribute {
    pub const ALL: [Self; 8] = [
        Self::BeginLine,
        Self::ActionLine,
        Self::EndLine,
        Self::DisplayPage,
        Self::StepPieces,
        Self::ModelIndex,
        Self::ModelLine,
        Self::ModelStep,
    ];

    /// Slots holding a line number inside the owning model.
    pub fn is_line(self) -> bool {
        matches!(
            self,
            Self::BeginLine | Self::ActionLine | Self::EndLine | Self::ModelLine
        )
    }
}

/// Attribute vector of a build modification. `None` is the unset sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildModAttributes([Option<usize>; 8]);

impl BuildModAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attribute: BuildModAttribute) -> Option<usize> {
        self.0[attribute as usize]
    }

    pub fn set(&mut self, attribute: BuildModAttribute, value: usize) {
        self.0[attribute as usize] = Some(value);
    }

    #[must_use]
    pub fn with(mut self, attribute: BuildModAttribute, value: usize) -> Self {
        self.set(attribute, value);
        self
    }

    /// Merge a re-derived attribute vector into this one.
    ///
    /// A slot is overwritten only when the incoming value is set and differs
    /// from the current value. Returns whether anything changed.
    pub fn merge(&mut self, incoming: &Self) -> bool {
        let mut changed = false;
        for (current, new) in self.0.iter_mut().zip(incoming.0) {
            if new.is_some() && new != *current {
                *current = new;
                changed = true;
            }
        }
        changed
    }

    /// Shift line-number slots at or after `from` by `delta`.
    pub fn shift_lines(&mut self, from: usize, delta: isize) {
        for attribute in BuildModAttribute::ALL {
            if !attribute.is_line() {
                continue;
            }
            if let Some(line) = self.get(attribute)
                && line >= from
            {
                self.set(attribute, line.saturating_add_signed(delta));
            }
        }
    }

    /// Adjust line slots after `removed` lines at `at` were replaced by
    /// `added` lines. Lines inside the removed range collapse onto `at`.
    pub fn splice_lines(&mut self, at: usize, removed: usize, added: usize) {
        let end = at + removed;
        for attribute in BuildModAttribute::ALL {
            if !attribute.is_line() {
                continue;
            }
            if let Some(line) = self.get(attribute)
                && line >= at
            {
                let moved = if line >= end { line - removed + added } else { at };
                self.set(attribute, moved);
            }
        }
    }
}
