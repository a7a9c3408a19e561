//! Render-ready step content for the 3D viewer.
//!
//! Each cached step holds three variants of the same content:
//!
//! - `unrotated`: every visible geometry line of the model up to the end of the step
//! - `rotated`: the step's `ROTSTEP` line, if any, followed by `unrotated`
//! - `viewer`: the content before the step, a `0 STEP`, then the step's own lines
//!
//! Lines hidden by a build modification at the step are left out.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use bis_model::{
    ActionPolicy, BuildModAction, BuildModCommand, LineType, MetaCommand, ViewerStepKey,
};

use crate::build_mod::{BuildModLevels, BuildModStore};

/// How a step is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ViewType {
    #[default]
    Step,
    MultiStep,
    Callout,
}

/// One cached step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerStep {
    pub key: ViewerStepKey,
    pub rotated: Vec<String>,
    pub unrotated: Vec<String>,
    pub viewer: Vec<String>,
    pub part_count: usize,
    pub modified: bool,
    pub view_type: ViewType,
}

impl ViewerStep {
    pub fn new(
        key: ViewerStepKey,
        rotated: Vec<String>,
        unrotated: Vec<String>,
        viewer: Vec<String>,
        view_type: ViewType,
    ) -> Self {
        let part_count = count_parts(&unrotated);
        Self {
            key,
            rotated,
            unrotated,
            viewer,
            part_count,
            modified: false,
            view_type,
        }
    }
}

fn count_parts(lines: &[String]) -> usize {
    lines
        .iter()
        .filter(|line| matches!(LineType::of(line), Ok(LineType::Part)))
        .count()
}

/// Cache of viewer steps keyed by [`ViewerStepKey`].
#[derive(Debug, Clone, Default)]
pub struct ViewerStepCache {
    steps: HashMap<ViewerStepKey, ViewerStep>,
}

impl ViewerStepCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn get(&self, key: &ViewerStepKey) -> Option<&ViewerStep> {
        self.steps.get(key)
    }

    pub fn contains(&self, key: &ViewerStepKey) -> bool {
        self.steps.contains_key(key)
    }

    pub fn insert(&mut self, step: ViewerStep) {
        self.steps.insert(step.key.clone(), step);
    }

    /// Keys sorted by model, line and step.
    pub fn keys(&self) -> Vec<ViewerStepKey> {
        let mut keys: Vec<_> = self.steps.keys().cloned().collect();
        keys.sort_by_key(|k| (k.model_index, k.line_number, k.step_number));
        keys
    }

    /// Replace the content of a cached step.
    ///
    /// Returns `false` when the key is not cached or the content is unchanged.
    /// A change recomputes the part count and marks the step modified.
    pub fn update_viewer_step(
        &mut self,
        key: &ViewerStepKey,
        rotated: Vec<String>,
        unrotated: Vec<String>,
        viewer: Vec<String>,
    ) -> bool {
        let Some(step) = self.steps.get_mut(key) else {
            return false;
        };
        if step.rotated.join("\n") == rotated.join("\n")
            && step.unrotated.join("\n") == unrotated.join("\n")
            && step.viewer.join("\n") == viewer.join("\n")
        {
            return false;
        }
        step.part_count = count_parts(&unrotated);
        step.rotated = rotated;
        step.unrotated = unrotated;
        step.viewer = viewer;
        step.modified = true;
        true
    }

    /// Drop every step of `model_index` that starts at or after `line`.
    pub fn invalidate_from(&mut self, model_index: usize, line: usize) -> usize {
        let before = self.steps.len();
        self.steps
            .retain(|key, _| key.model_index != model_index || key.line_number < line);
        let dropped = before - self.steps.len();
        if dropped > 0 {
            tracing::trace!(model_index, line, dropped, "viewer steps invalidated");
        }
        dropped
    }
}

/// Lines of a model between `top` and `bottom` resolved for display.
pub struct StepContent<'a> {
    pub contents: &'a [String],
    pub top: usize,
    pub bottom: usize,
    pub step_index: usize,
}

impl StepContent<'_> {
    /// Build the three content variants.
    ///
    /// Build-mod actions are looked up with the `Future` policy at the step,
    /// which may record a default Apply in `build_mods`.
    pub fn compose(&self, key: ViewerStepKey, build_mods: &mut BuildModStore) -> ViewerStep {
        let mut levels = BuildModLevels::new();
        let mut before = Vec::new();
        let mut current = Vec::new();
        let mut rotstep = None;
        let mut multi_step = 0usize;
        let mut callout = 0usize;
        let mut view_type = ViewType::Step;

        let end = self.bottom.min(self.contents.len().saturating_sub(1));
        for (number, line) in self.contents.iter().enumerate().take(end + 1) {
            if number == self.top {
                view_type = if callout > 0 {
                    ViewType::Callout
                } else if multi_step > 0 {
                    ViewType::MultiStep
                } else {
                    ViewType::Step
                };
            }
            match MetaCommand::parse(line) {
                Some(MetaCommand::BuildMod {
                    command: BuildModCommand::Begin,
                    key: Some(mod_key),
                }) => {
                    let action = build_mods
                        .build_mod_action(&mod_key, self.step_index, ActionPolicy::Future)
                        .unwrap_or(BuildModAction::Apply);
                    levels.begin(&mod_key, action, number);
                }
                Some(MetaCommand::BuildMod {
                    command: BuildModCommand::EndMod,
                    ..
                }) => {
                    levels.end_mod();
                }
                Some(MetaCommand::BuildMod {
                    command: BuildModCommand::End,
                    ..
                }) => {
                    levels.end();
                }
                Some(MetaCommand::RotStep) if number >= self.top => rotstep = Some(line.clone()),
                Some(MetaCommand::MultiStepBegin) => multi_step += 1,
                Some(MetaCommand::MultiStepEnd) => multi_step = multi_step.saturating_sub(1),
                Some(MetaCommand::CalloutBegin) => callout += 1,
                Some(MetaCommand::CalloutEnd) => callout = callout.saturating_sub(1),
                Some(_) => {}
                None => {
                    let geometry = LineType::of(line).is_ok_and(LineType::is_geometry);
                    if !geometry || levels.is_suppressed() {
                        continue;
                    }
                    if number < self.top {
                        before.push(line.clone());
                    } else {
                        current.push(line.clone());
                    }
                }
            }
        }

        let mut unrotated = before.clone();
        unrotated.extend(current.iter().cloned());

        let mut rotated = Vec::with_capacity(unrotated.len() + 1);
        rotated.extend(rotstep);
        rotated.extend(unrotated.iter().cloned());

        let mut viewer = before;
        viewer.push("0 STEP".to_string());
        viewer.extend(current);

        ViewerStep::new(key, rotated, unrotated, viewer, view_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bis_model::{BuildModAttributes, KeySuffix};

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    const A: &str = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat";
    const B: &str = "1 1 0 -24 0 1 0 0 0 1 0 0 0 1 3003.dat";

    #[test]
    fn test_compose_variants() {
        let contents = lines(&format!("0 Title\n{A}\n0 STEP\n{B}\n0 ROTSTEP 0 90 0 ABS"));
        let mut mods = BuildModStore::new();
        let step = StepContent {
            contents: &contents,
            top: 3,
            bottom: 4,
            step_index: 1,
        }
        .compose(ViewerStepKey::new(0, 3, 2), &mut mods);

        assert_eq!(step.unrotated, [A, B]);
        assert_eq!(step.rotated, ["0 ROTSTEP 0 90 0 ABS", A, B]);
        assert_eq!(step.viewer, [A, "0 STEP", B]);
        assert_eq!(step.part_count, 2);
        assert_eq!(step.view_type, ViewType::Step);
    }

    #[test]
    fn test_compose_hides_removed_patch() {
        let contents = lines(&format!(
            "0 !LPUB BUILD_MOD BEGIN k\n{B}\n0 !LPUB BUILD_MOD END_MOD\n{A}\n0 !LPUB BUILD_MOD END"
        ));
        let mut mods = BuildModStore::new();
        mods.insert_build_mod("k", BuildModAttributes::new(), 3);
        let compose = |mods: &mut BuildModStore, step_index| {
            StepContent {
                contents: &contents,
                top: 0,
                bottom: 4,
                step_index,
            }
            .compose(ViewerStepKey::new(0, 0, 1), mods)
        };

        // Before the patch's first step it has not happened yet.
        assert_eq!(compose(&mut mods, 1).unrotated, [A]);
        assert_eq!(compose(&mut mods, 3).unrotated, [B]);
    }

    #[test]
    fn test_multi_step_view_type() {
        let contents = lines(&format!("0 !LPUB MULTI_STEP BEGIN\n{A}\n0 STEP"));
        let step = StepContent {
            contents: &contents,
            top: 1,
            bottom: 2,
            step_index: 0,
        }
        .compose(ViewerStepKey::new(0, 1, 1), &mut BuildModStore::new());
        assert_eq!(step.view_type, ViewType::MultiStep);
    }

    #[test]
    fn test_update_uses_content_comparison() {
        let key = ViewerStepKey::new(0, 0, 1);
        let mut cache = ViewerStepCache::new();
        cache.insert(ViewerStep::new(
            key.clone(),
            lines(A),
            lines(A),
            lines(A),
            ViewType::Step,
        ));

        assert!(!cache.update_viewer_step(&key, lines(A), lines(A), lines(A)));
        assert!(!cache.get(&key).unwrap().modified);

        let both = vec![A.to_string(), B.to_string()];
        assert!(cache.update_viewer_step(&key, both.clone(), both.clone(), both));
        let step = cache.get(&key).unwrap();
        assert!(step.modified);
        assert_eq!(step.part_count, 2);
    }

    #[test]
    fn test_invalidate_from() {
        let mut cache = ViewerStepCache::new();
        for (model, line, number) in [(0, 0, 1), (0, 5, 2), (1, 0, 1), (0, 9, 3)] {
            cache.insert(ViewerStep::new(
                ViewerStepKey::new(model, line, number),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                ViewType::Step,
            ));
        }
        cache.insert(ViewerStep::new(
            ViewerStepKey::new(0, 5, 2).with_suffix(KeySuffix::FinalModel),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            ViewType::Step,
        ));

        assert_eq!(cache.invalidate_from(0, 5), 3);
        assert_eq!(
            cache.keys(),
            [ViewerStepKey::new(0, 0, 1), ViewerStepKey::new(1, 0, 1)]
        );
    }
}
