//! Build-modification store.
//!
//! A build modification is a named patch region inside a step:
//!
//! ```text
//! 0 !LPUB BUILD_MOD BEGIN <key>
//!   ...modified content, shown while the action is Apply...
//! 0 !LPUB BUILD_MOD END_MOD
//!   ...original content, shown while the action is Remove...
//! 0 !LPUB BUILD_MOD END
//! ```
//!
//! Later steps toggle the patch with `APPLY <key>` / `REMOVE <key>`. The store
//! keeps, per key, the attribute vector and the action recorded at each step
//! index, plus per-step rows saying which patches a step carries.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use bis_model::{ActionPolicy, BuildModAction, BuildModAttribute, BuildModAttributes};

/// A named reversible patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMod {
    /// Key with its original spelling.
    pub key: String,
    pub attributes: BuildModAttributes,
    /// Action recorded per step index.
    pub actions: BTreeMap<usize, BuildModAction>,
    /// Names of the models to invalidate when this patch changes, innermost first.
    pub submodel_stack: Vec<String>,
    /// Models this patch has been rendered into.
    pub rendered: BTreeSet<String>,
}

impl BuildMod {
    fn new(key: &str, attributes: BuildModAttributes) -> Self {
        Self {
            key: key.to_string(),
            attributes,
            actions: BTreeMap::new(),
            submodel_stack: Vec::new(),
            rendered: BTreeSet::new(),
        }
    }

    /// Step index of the first recorded action.
    pub fn first_step(&self) -> Option<usize> {
        self.actions.keys().next().copied()
    }

    /// Model the patch lives in.
    pub fn model_index(&self) -> Option<usize> {
        self.attributes.get(BuildModAttribute::ModelIndex)
    }

    fn resolve(&self, step_index: usize, policy: ActionPolicy) -> Option<BuildModAction> {
        let exact = self.actions.get(&step_index).copied();
        let previous = || self.actions.range(..=step_index).next_back().map(|(_, a)| *a);
        match policy {
            ActionPolicy::Current => exact,
            ActionPolicy::Last => self.actions.values().next_back().copied(),
            ActionPolicy::Previous => previous(),
            ActionPolicy::Next => self.actions.range(step_index..).next().map(|(_, a)| *a),
            ActionPolicy::Future => match self.first_step() {
                Some(first) if step_index < first => Some(BuildModAction::Remove),
                _ => previous(),
            },
        }
    }
}

/// One row of the per-step table: `key` has `action` at `step_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildModStep {
    pub step_index: usize,
    pub action: BuildModAction,
    pub key: String,
}

/// All build modifications of a document.
#[derive(Debug, Clone, Default)]
pub struct BuildModStore {
    mods: BTreeMap<String, BuildMod>,
    steps: BTreeMap<usize, Vec<BuildModStep>>,
}

fn lookup_key(key: &str) -> String {
    key.trim().to_lowercase()
}

impl BuildModStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.mods.contains_key(&lookup_key(key))
    }

    pub fn get(&self, key: &str) -> Option<&BuildMod> {
        self.mods.get(&lookup_key(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildMod> {
        self.mods.values()
    }

    /// Keys in their original spelling.
    pub fn keys(&self) -> Vec<String> {
        self.mods.values().map(|m| m.key.clone()).collect()
    }

    /// Keys of the patches that live in one model.
    pub fn keys_for_model(&self, model_index: usize) -> Vec<String> {
        self.mods
            .values()
            .filter(|m| m.model_index() == Some(model_index))
            .map(|m| m.key.clone())
            .collect()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.mods.clear();
        self.steps.clear();
    }

    /// Drop the per-step rows ahead of a recount. Patches and their action
    /// history survive.
    pub fn clear_steps(&mut self) {
        self.steps.clear();
    }

    /// Create a patch, or merge re-derived attributes into an existing one.
    ///
    /// A new patch starts out applied at `step_index`. A merge keeps the
    /// action history and submodel stack, and overwrites only the attribute
    /// slots that are set and changed. Returns `true` when a patch was created.
    pub fn insert_build_mod(
        &mut self,
        key: &str,
        attributes: BuildModAttributes,
        step_index: usize,
    ) -> bool {
        let lookup = lookup_key(key);
        if let Some(existing) = self.mods.get_mut(&lookup) {
            if existing.attributes.merge(&attributes) {
                tracing::trace!(key, "build mod attributes updated");
            }
            return false;
        }
        let mut build_mod = BuildMod::new(key, attributes);
        build_mod.actions.insert(step_index, BuildModAction::Apply);
        self.mods.insert(lookup, build_mod);
        self.insert_step_row(step_index, BuildModAction::Apply, key);
        tracing::debug!(key, step_index, "build mod created");
        true
    }

    /// The action of `key` at `step_index` under `policy`, without side effects.
    pub fn resolve_action(
        &self,
        key: &str,
        step_index: usize,
        policy: ActionPolicy,
    ) -> Option<BuildModAction> {
        self.get(key)?.resolve(step_index, policy)
    }

    /// The action of `key` at `step_index` under `policy`.
    ///
    /// When the policy finds nothing the patch is taken as applied and that
    /// Apply is recorded at `step_index`, so later lookups of the same step
    /// agree. Returns `None` only for an unknown key.
    pub fn build_mod_action(
        &mut self,
        key: &str,
        step_index: usize,
        policy: ActionPolicy,
    ) -> Option<BuildModAction> {
        let build_mod = self.mods.get_mut(&lookup_key(key))?;
        if let Some(action) = build_mod.resolve(step_index, policy) {
            return Some(action);
        }
        build_mod.actions.insert(step_index, BuildModAction::Apply);
        tracing::trace!(key, step_index, "defaulting build mod to apply");
        Some(BuildModAction::Apply)
    }

    /// Record `action` for `key` at `step_index`.
    ///
    /// Unknown keys are logged and ignored; returns whether anything was set.
    pub fn set_build_mod_action(
        &mut self,
        key: &str,
        step_index: usize,
        action: BuildModAction,
    ) -> bool {
        let Some(build_mod) = self.mods.get_mut(&lookup_key(key)) else {
            tracing::warn!(key, step_index, %action, "build mod action for unknown key ignored");
            return false;
        };
        build_mod.actions.insert(step_index, action);
        build_mod.rendered.clear();
        let original = build_mod.key.clone();
        self.insert_step_row(step_index, action, &original);
        true
    }

    /// Record an action read from the file during a recount.
    ///
    /// An action already recorded at `step_index` wins, so toggles made
    /// between scans survive. The step row is written either way. Returns the
    /// action in force, or `None` for an unknown key.
    pub fn record_step_action(
        &mut self,
        key: &str,
        step_index: usize,
        action: BuildModAction,
    ) -> Option<BuildModAction> {
        let build_mod = self.mods.get_mut(&lookup_key(key))?;
        let action = *build_mod.actions.entry(step_index).or_insert(action);
        let original = build_mod.key.clone();
        self.insert_step_row(step_index, action, &original);
        Some(action)
    }

    /// Remove a patch and every per-step row it owns.
    pub fn delete_build_mod(&mut self, key: &str) -> Option<BuildMod> {
        let lookup = lookup_key(key);
        let removed = self.mods.remove(&lookup)?;
        for rows in self.steps.values_mut() {
            rows.retain(|row| lookup_key(&row.key) != lookup);
        }
        self.steps.retain(|_, rows| !rows.is_empty());
        tracing::debug!(key, "build mod deleted");
        Some(removed)
    }

    // === Per-step rows ===

    /// Record that `key` carries `action` at `step_index`, replacing any
    /// earlier row for the same key and step.
    pub fn insert_step_row(&mut self, step_index: usize, action: BuildModAction, key: &str) {
        let lookup = lookup_key(key);
        let rows = self.steps.entry(step_index).or_default();
        rows.retain(|row| lookup_key(&row.key) != lookup);
        rows.push(BuildModStep {
            step_index,
            action,
            key: key.to_string(),
        });
    }

    /// The action `key` carries at `step_index`, if the step has a row for it.
    pub fn build_mod_step_action(&self, step_index: usize, key: &str) -> Option<BuildModAction> {
        let lookup = lookup_key(key);
        self.steps
            .get(&step_index)?
            .iter()
            .find(|row| lookup_key(&row.key) == lookup)
            .map(|row| row.action)
    }

    /// Rows of one step.
    pub fn build_mod_steps(&self, step_index: usize) -> &[BuildModStep] {
        self.steps.get(&step_index).map_or(&[], Vec::as_slice)
    }

    /// Every row, ordered by step.
    pub fn all_steps(&self) -> impl Iterator<Item = &BuildModStep> {
        self.steps.values().flatten()
    }

    // === Attributes and bookkeeping ===

    pub fn attributes(&self, key: &str) -> Option<BuildModAttributes> {
        self.get(key).map(|m| m.attributes)
    }

    pub fn set_attribute(&mut self, key: &str, attribute: BuildModAttribute, value: usize) -> bool {
        match self.mods.get_mut(&lookup_key(key)) {
            Some(build_mod) => {
                build_mod.attributes.set(attribute, value);
                true
            }
            None => false,
        }
    }

    pub fn set_submodel_stack(&mut self, key: &str, stack: Vec<String>) {
        if let Some(build_mod) = self.mods.get_mut(&lookup_key(key)) {
            build_mod.submodel_stack = stack;
        }
    }

    pub fn submodel_stack(&self, key: &str) -> &[String] {
        self.get(key).map_or(&[], |m| m.submodel_stack.as_slice())
    }

    pub fn set_rendered(&mut self, key: &str, model: &str) {
        if let Some(build_mod) = self.mods.get_mut(&lookup_key(key)) {
            build_mod.rendered.insert(model.to_lowercase());
        }
    }

    pub fn is_rendered(&self, key: &str, model: &str) -> bool {
        self.get(key)
            .is_some_and(|m| m.rendered.contains(&model.to_lowercase()))
    }

    /// Shift line attributes of patches in `model_index` after an edit.
    pub fn shift_lines(&mut self, model_index: usize, from: usize, delta: isize) {
        for build_mod in self
            .mods
            .values_mut()
            .filter(|m| m.model_index() == Some(model_index))
        {
            build_mod.attributes.shift_lines(from, delta);
        }
    }

    /// Splice line attributes of patches in `model_index`, see
    /// [`BuildModAttributes::splice_lines`].
    pub fn splice_lines(&mut self, model_index: usize, at: usize, removed: usize, added: usize) {
        for build_mod in self
            .mods
            .values_mut()
            .filter(|m| m.model_index() == Some(model_index))
        {
            build_mod.attributes.splice_lines(at, removed, added);
        }
    }
}

/// Which part of a patch region a parser is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModRegion {
    /// Between `BEGIN` and `END_MOD`.
    Modified,
    /// Between `END_MOD` and `END`.
    Original,
}

/// One open patch region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelFrame {
    pub key: String,
    /// Arena index of the enclosing frame.
    pub parent: Option<usize>,
    pub region: ModRegion,
    /// Action in force for this pass.
    pub action: BuildModAction,
    pub begin_line: usize,
}

impl LevelFrame {
    /// Whether content at this frame's current position is hidden.
    pub fn suppresses(&self) -> bool {
        matches!(
            (self.region, self.action),
            (ModRegion::Modified, BuildModAction::Remove)
                | (ModRegion::Original, BuildModAction::Apply)
        )
    }
}

/// Nesting of patch regions while a model is scanned.
///
/// Frames live in an arena; `top` links back through `parent` indexes.
/// Rolling back to a checkpoint truncates the arena.
#[derive(Debug, Clone, Default)]
pub struct BuildModLevels {
    frames: Vec<LevelFrame>,
    top: Option<usize>,
}

impl BuildModLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a region. Returns the new nesting depth.
    pub fn begin(&mut self, key: &str, action: BuildModAction, begin_line: usize) -> usize {
        self.frames.push(LevelFrame {
            key: key.to_string(),
            parent: self.top,
            region: ModRegion::Modified,
            action,
            begin_line,
        });
        self.top = Some(self.frames.len() - 1);
        self.depth()
    }

    /// Switch the innermost region to its original content.
    pub fn end_mod(&mut self) -> Option<&LevelFrame> {
        let top = self.top?;
        let frame = &mut self.frames[top];
        frame.region = ModRegion::Original;
        Some(frame)
    }

    /// Close the innermost region.
    pub fn end(&mut self) -> Option<LevelFrame> {
        let top = self.top?;
        let frame = self.frames[top].clone();
        self.top = frame.parent;
        Some(frame)
    }

    pub fn current(&self) -> Option<&LevelFrame> {
        self.top.map(|top| &self.frames[top])
    }

    /// Number of open regions.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.top;
        while let Some(index) = cursor {
            depth += 1;
            cursor = self.frames[index].parent;
        }
        depth
    }

    /// Whether any open region hides the current content.
    pub fn is_suppressed(&self) -> bool {
        let mut cursor = self.top;
        while let Some(index) = cursor {
            let frame = &self.frames[index];
            if frame.suppresses() {
                return true;
            }
            cursor = frame.parent;
        }
        false
    }

    /// Keys of the open regions, innermost first.
    pub fn open_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        let mut cursor = self.top;
        while let Some(index) = cursor {
            keys.push(self.frames[index].key.clone());
            cursor = self.frames[index].parent;
        }
        keys
    }

    pub fn checkpoint(&self) -> LevelMark {
        LevelMark {
            len: self.frames.len(),
            top: self.top,
        }
    }

    /// Forget every frame opened after `mark` was taken.
    pub fn rollback(&mut self, mark: LevelMark) {
        self.frames.truncate(mark.len);
        self.top = mark.top;
    }
}

/// Saved position in a [`BuildModLevels`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelMark {
    len: usize,
    top: Option<usize>,
}
