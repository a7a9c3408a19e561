//! Instance counting and step indexing.
//!
//! One pass walks the document depth-first from the top-level model. For
//! every submodel it meets it counts placements and mirrored placements,
//! finds its counted steps and appends them to the [`StepIndex`], and
//! records build-modification bookkeeping at each step boundary.
//!
//! A submodel is descended into once per pass, at its first placement, so
//! its steps land in the index just before the parent step that places it.

use std::collections::{BTreeSet, HashSet};

use bis_model::{
    ActionPolicy, BuildModAction, BuildModAttribute, BuildModAttributes, BuildModCommand,
    Ledger, LedgerCategory, LedgerEntry, LineType, MetaCommand, PartLine, Severity, StepPos,
    normalize_name,
};

use crate::build_mod::{BuildModLevels, BuildModStore};
use crate::registry::SubModelRegistry;
use crate::step_index::StepIndex;

/// Outcome of a counting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountReport {
    /// Entries in the step index.
    pub steps: usize,
    /// Submodels walked.
    pub models: usize,
    /// Recursive references skipped.
    pub recursive: usize,
}

/// Build-mod bookkeeping waiting for its step index.
#[derive(Debug, Clone)]
enum PendingMod {
    Region {
        key: String,
        attributes: BuildModAttributes,
        action: BuildModAction,
    },
    Toggle {
        key: String,
        action: BuildModAction,
        line: usize,
    },
}

/// Per-model scan state.
#[derive(Debug, Default)]
struct ModelScan {
    step_top: usize,
    added: bool,
    pieces: usize,
    counted_steps: usize,
    callout_depth: usize,
    pending: Vec<PendingMod>,
    end_mod_line: Option<usize>,
}

/// Runs one counting pass over a document.
pub struct InstanceCounter<'a> {
    registry: &'a mut SubModelRegistry,
    steps: &'a mut StepIndex,
    build_mods: &'a mut BuildModStore,
    ledger: &'a mut Ledger,
    missing: &'a BTreeSet<String>,
    counted: HashSet<usize>,
    stack: Vec<usize>,
    report: CountReport,
}

impl<'a> InstanceCounter<'a> {
    pub fn new(
        registry: &'a mut SubModelRegistry,
        steps: &'a mut StepIndex,
        build_mods: &'a mut BuildModStore,
        ledger: &'a mut Ledger,
        missing: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            registry,
            steps,
            build_mods,
            ledger,
            missing,
            counted: HashSet::new(),
            stack: Vec::new(),
            report: CountReport::default(),
        }
    }

    /// Recount from the top-level model.
    ///
    /// Counters, the step index and the per-step build-mod rows are rebuilt.
    /// Build mods and their recorded actions are kept.
    pub fn run(mut self) -> CountReport {
        self.registry.reset_counts();
        self.steps.clear();
        self.build_mods.clear_steps();

        if let Some(top) = self.registry.by_index_mut(0) {
            top.instances = 1;
            self.walk(0);
        }

        self.report.steps = self.steps.len();
        tracing::debug!(
            steps = self.report.steps,
            models = self.report.models,
            "instance count complete"
        );
        self.report
    }

    fn walk(&mut self, model_index: usize) {
        let Some(model) = self.registry.by_index(model_index) else {
            return;
        };
        let name = model.name.clone();
        let contents = model.contents.clone();
        self.stack.push(model_index);
        self.report.models += 1;

        let mut scan = ModelScan::default();
        let mut levels = BuildModLevels::new();

        for (line_number, line) in contents.iter().enumerate() {
            match MetaCommand::parse(line) {
                Some(MetaCommand::BuildMod { command, key }) => {
                    self.build_mod_command(
                        &mut scan,
                        &mut levels,
                        model_index,
                        line_number,
                        command,
                        key,
                    );
                }
                Some(MetaCommand::CalloutBegin) => scan.callout_depth += 1,
                Some(MetaCommand::CalloutEnd) => {
                    scan.callout_depth = scan.callout_depth.saturating_sub(1);
                }
                Some(command) if command.is_step_boundary() => {
                    if scan.callout_depth > 0 {
                        continue;
                    }
                    // An empty step folds into the next one.
                    if scan.added {
                        self.close_step(&mut scan, model_index);
                        scan.step_top = line_number + 1;
                    }
                }
                Some(_) => {}
                None => {
                    if levels.is_suppressed() {
                        continue;
                    }
                    self.content_line(&mut scan, model_index, line_number, line);
                }
            }
        }

        if levels.depth() > 0 {
            for key in levels.open_keys() {
                self.ledger.push(
                    LedgerEntry::new(
                        Severity::Warning,
                        LedgerCategory::BuildMod,
                        format!("build mod '{key}' is never closed"),
                    )
                    .in_model(&name),
                );
            }
        }
        if scan.added || !scan.pending.is_empty() || scan.counted_steps == 0 {
            self.close_step(&mut scan, model_index);
        }

        if let Some(model) = self.registry.by_index_mut(model_index) {
            model.num_steps = scan.counted_steps;
        }
        self.stack.pop();
        self.counted.insert(model_index);
    }

    fn content_line(
        &mut self,
        scan: &mut ModelScan,
        model_index: usize,
        line_number: usize,
        line: &str,
    ) {
        let Ok(line_type) = LineType::of(line) else {
            return;
        };
        if !line_type.is_geometry() {
            return;
        }
        let in_callout = scan.callout_depth > 0;
        if line_type != LineType::Part {
            if !in_callout {
                scan.added = true;
            }
            return;
        }

        // Malformed part lines were reported by the loader.
        let Ok(part) = PartLine::parse(line) else {
            return;
        };
        let key = normalize_name(&part.file);
        if self.missing.contains(&key) {
            return;
        }
        if !in_callout {
            scan.added = true;
            scan.pieces += 1;
        }

        let Some(child) = self.registry.index_of(&part.file) else {
            return;
        };
        if self.stack.contains(&child) {
            self.report.recursive += 1;
            let parent = self.registry.by_index(model_index).map(|m| m.name.clone());
            let mut entry = LedgerEntry::new(
                Severity::Error,
                LedgerCategory::RecursiveReference,
                format!("'{}' references itself", part.file),
            )
            .at_line(line_number);
            if let Some(parent) = parent {
                entry = entry.in_model(parent);
            }
            self.ledger.push(entry);
            return;
        }

        let mirrored = part.is_mirrored();
        let Some(child_model) = self.registry.by_index_mut(child) else {
            return;
        };
        child_model.instances += 1;
        if mirrored {
            child_model.mirror_instances += 1;
        }
        let leaf = child_model.unofficial.is_part() || child_model.flags.data_file;

        if let Some(parent) = self.registry.by_index_mut(model_index)
            && !parent.children.contains(&child)
        {
            parent.children.push(child);
        }

        if !leaf && !self.counted.contains(&child) {
            self.walk(child);
        }
    }

    fn build_mod_command(
        &mut self,
        scan: &mut ModelScan,
        levels: &mut BuildModLevels,
        model_index: usize,
        line_number: usize,
        command: BuildModCommand,
        key: Option<String>,
    ) {
        match (command, key) {
            (BuildModCommand::Begin, Some(key)) => {
                let action = self.action_at_begin(&key);
                levels.begin(&key, action, line_number);
                scan.end_mod_line = None;
            }
            (BuildModCommand::EndMod, _) => {
                if levels.end_mod().is_some() {
                    scan.end_mod_line = Some(line_number);
                }
            }
            (BuildModCommand::End, _) => {
                let Some(frame) = levels.end() else {
                    self.stray_build_mod(model_index, line_number, "END without BEGIN");
                    return;
                };
                let mut attributes = BuildModAttributes::new()
                    .with(BuildModAttribute::BeginLine, frame.begin_line)
                    .with(BuildModAttribute::EndLine, line_number)
                    .with(BuildModAttribute::ModelIndex, model_index)
                    .with(BuildModAttribute::ModelLine, scan.step_top)
                    .with(BuildModAttribute::ModelStep, scan.counted_steps + 1);
                if let Some(action_line) = scan.end_mod_line.take() {
                    attributes.set(BuildModAttribute::ActionLine, action_line);
                }
                scan.pending.push(PendingMod::Region {
                    key: frame.key,
                    attributes,
                    action: frame.action,
                });
                scan.added = true;
            }
            (BuildModCommand::Apply | BuildModCommand::Remove, Some(key)) => {
                if levels.is_suppressed() {
                    return;
                }
                let action = if command == BuildModCommand::Apply {
                    BuildModAction::Apply
                } else {
                    BuildModAction::Remove
                };
                scan.pending.push(PendingMod::Toggle {
                    key,
                    action,
                    line: line_number,
                });
                scan.added = true;
            }
            (_, None) => {
                self.stray_build_mod(model_index, line_number, "build mod command without a key");
            }
        }
    }

    /// Action in force where a region opens: the nearest recorded action at
    /// or before the step being built, else the first one after it, else Apply.
    fn action_at_begin(&self, key: &str) -> BuildModAction {
        let predicted = self.steps.len();
        self.build_mods
            .resolve_action(key, predicted, ActionPolicy::Previous)
            .or_else(|| {
                self.build_mods
                    .resolve_action(key, predicted, ActionPolicy::Next)
            })
            .unwrap_or(BuildModAction::Apply)
    }

    fn stray_build_mod(&mut self, model_index: usize, line_number: usize, message: &str) {
        let mut entry = LedgerEntry::new(Severity::Warning, LedgerCategory::BuildMod, message)
            .at_line(line_number);
        if let Some(model) = self.registry.by_index(model_index) {
            entry = entry.in_model(&model.name);
        }
        self.ledger.push(entry);
    }

    /// Append the open step to the index and flush its build-mod bookkeeping.
    fn close_step(&mut self, scan: &mut ModelScan, model_index: usize) {
        let step_index = self.steps.push(StepPos::new(model_index, scan.step_top));
        scan.counted_steps += 1;

        let stack: Vec<String> = self
            .stack
            .iter()
            .rev()
            .filter_map(|&i| self.registry.by_index(i).map(|m| m.name.clone()))
            .collect();

        for pending in std::mem::take(&mut scan.pending) {
            match pending {
                PendingMod::Region {
                    key,
                    mut attributes,
                    action,
                } => {
                    attributes.set(BuildModAttribute::StepPieces, scan.pieces);
                    if self
                        .build_mods
                        .insert_build_mod(&key, attributes, step_index)
                        && let Some(model) = self.registry.by_index_mut(model_index)
                    {
                        model.build_mod_count += 1;
                    }
                    self.build_mods.record_step_action(&key, step_index, action);
                    self.build_mods.set_submodel_stack(&key, stack.clone());
                }
                PendingMod::Toggle { key, action, line } => {
                    if self
                        .build_mods
                        .record_step_action(&key, step_index, action)
                        .is_none()
                    {
                        let mut entry = LedgerEntry::new(
                            Severity::Warning,
                            LedgerCategory::BuildMod,
                            format!("{action} of unknown build mod '{key}' ignored"),
                        )
                        .at_line(line);
                        if let Some(model) = self.registry.by_index(model_index) {
                            entry = entry.in_model(&model.name);
                        }
                        self.ledger.push(entry);
                    }
                }
            }
        }

        scan.added = false;
        scan.pieces = 0;
    }
}

/// Convenience wrapper running a full pass.
pub fn count_instances(
    registry: &mut SubModelRegistry,
    steps: &mut StepIndex,
    build_mods: &mut BuildModStore,
    ledger: &mut Ledger,
    missing: &BTreeSet<String>,
) -> CountReport {
    InstanceCounter::new(registry, steps, build_mods, ledger, missing).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bis_model::SubModelMeta;

    fn model(registry: &mut SubModelRegistry, name: &str, text: &str) -> usize {
        registry.insert(
            name,
            text.lines().map(str::to_string).collect(),
            SubModelMeta::default(),
        )
    }

    struct Fixture {
        registry: SubModelRegistry,
        steps: StepIndex,
        build_mods: BuildModStore,
        ledger: Ledger,
        missing: BTreeSet<String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: SubModelRegistry::new(),
                steps: StepIndex::new(),
                build_mods: BuildModStore::new(),
                ledger: Ledger::new(),
                missing: BTreeSet::new(),
            }
        }

        fn count(&mut self) -> CountReport {
            count_instances(
                &mut self.registry,
                &mut self.steps,
                &mut self.build_mods,
                &mut self.ledger,
                &self.missing,
            )
        }
    }

    const BRICK: &str = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat";

    #[test]
    fn test_steps_only_count_when_something_was_added() {
        let mut fx = Fixture::new();
        model(
            &mut fx.registry,
            "main.ldr",
            &format!("0 Main\n0 STEP\n{BRICK}\n0 STEP\n0 STEP\n{BRICK}\n0 STEP"),
        );
        fx.count();
        assert_eq!(fx.registry.by_index(0).unwrap().num_steps, 2);
        assert_eq!(
            fx.steps.entries(),
            [StepPos::new(0, 0), StepPos::new(0, 4)]
        );
    }

    #[test]
    fn test_nested_steps_precede_parent_step() {
        let mut fx = Fixture::new();
        model(
            &mut fx.registry,
            "main.ldr",
            &format!("{BRICK}\n0 STEP\n1 1 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n0 STEP"),
        );
        model(&mut fx.registry, "sub.ldr", &format!("{BRICK}\n0 STEP\n{BRICK}"));
        fx.count();

        assert_eq!(
            fx.steps.entries(),
            [
                StepPos::new(0, 0),
                StepPos::new(1, 0),
                StepPos::new(1, 2),
                StepPos::new(0, 2)
            ]
        );
        assert_eq!(fx.registry.by_index(0).unwrap().children, vec![1]);
    }

    #[test]
    fn test_mirrored_and_repeated_placements() {
        let mut fx = Fixture::new();
        model(
            &mut fx.registry,
            "main.ldr",
            "1 1 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n1 1 0 0 0 -1 0 0 0 1 0 0 0 1 sub.ldr",
        );
        model(&mut fx.registry, "sub.ldr", BRICK);
        let report = fx.count();

        let sub = fx.registry.get("sub.ldr").unwrap();
        assert_eq!(sub.instances, 2);
        assert_eq!(sub.mirror_instances, 1);
        assert_eq!(sub.num_steps, 1);
        assert_eq!(report.models, 2);
    }

    #[test]
    fn test_empty_model_still_gets_one_step() {
        let mut fx = Fixture::new();
        model(&mut fx.registry, "main.ldr", "0 Just a title\n0 STEP");
        fx.count();
        assert_eq!(fx.registry.by_index(0).unwrap().num_steps, 1);
        assert_eq!(fx.steps.entries(), [StepPos::new(0, 0)]);
    }

    #[test]
    fn test_missing_references_are_not_counted() {
        let mut fx = Fixture::new();
        model(
            &mut fx.registry,
            "main.ldr",
            "1 1 0 0 0 1 0 0 0 1 0 0 0 1 ghost.dat\n0 STEP\n1 1 0 0 0 1 0 0 0 1 0 0 0 1 ghost.dat\n0 STEP",
        );
        fx.missing.insert("ghost.dat".to_string());
        fx.count();
        assert_eq!(fx.registry.by_index(0).unwrap().num_steps, 1);
    }

    #[test]
    fn test_recursive_reference_is_reported() {
        let mut fx = Fixture::new();
        model(&mut fx.registry, "a.ldr", "1 1 0 0 0 1 0 0 0 1 0 0 0 1 b.ldr");
        model(&mut fx.registry, "b.ldr", "1 1 0 0 0 1 0 0 0 1 0 0 0 1 a.ldr");
        let report = fx.count();
        assert_eq!(report.recursive, 1);
        assert!(fx.ledger.has(LedgerCategory::RecursiveReference));
    }

    #[test]
    fn test_callout_content_does_not_count_for_host() {
        let mut fx = Fixture::new();
        model(
            &mut fx.registry,
            "main.ldr",
            &format!(
                "{BRICK}\n0 STEP\n0 !LPUB CALLOUT BEGIN\n1 1 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n0 !LPUB CALLOUT END\n0 STEP"
            ),
        );
        model(&mut fx.registry, "sub.ldr", BRICK);
        fx.count();
        assert_eq!(fx.registry.by_index(0).unwrap().num_steps, 1);
        assert_eq!(fx.registry.get("sub.ldr").unwrap().instances, 1);
        assert_eq!(fx.steps.steps_of(1).len(), 1);
    }

    #[test]
    fn test_removed_region_hides_references() {
        let mut fx = Fixture::new();
        model(
            &mut fx.registry,
            "main.ldr",
            &format!(
                "0 !LPUB BUILD_MOD BEGIN door\n1 1 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n0 !LPUB BUILD_MOD END_MOD\n{BRICK}\n0 !LPUB BUILD_MOD END\n0 STEP"
            ),
        );
        model(&mut fx.registry, "sub.ldr", BRICK);
        fx.count();
        assert_eq!(fx.registry.get("sub.ldr").unwrap().instances, 1);
        assert_eq!(fx.registry.by_index(0).unwrap().build_mod_count, 1);

        let attributes = fx.build_mods.attributes("door").unwrap();
        assert_eq!(attributes.get(BuildModAttribute::BeginLine), Some(0));
        assert_eq!(attributes.get(BuildModAttribute::ActionLine), Some(2));
        assert_eq!(attributes.get(BuildModAttribute::EndLine), Some(4));

        let step = fx.steps.len() - 1;
        fx.build_mods
            .set_build_mod_action("door", step, BuildModAction::Remove);
        fx.count();
        assert_eq!(fx.registry.get("sub.ldr").unwrap().instances, 0);
        assert!(fx.registry.by_index(0).unwrap().children.is_empty());
        assert_eq!(fx.registry.by_index(0).unwrap().build_mod_count, 1);
    }

    #[test]
    fn test_unknown_toggle_is_logged() {
        let mut fx = Fixture::new();
        model(
            &mut fx.registry,
            "main.ldr",
            &format!("{BRICK}\n0 STEP\n0 !LPUB BUILD_MOD REMOVE nothing\n0 STEP"),
        );
        fx.count();
        assert!(fx.ledger.has(LedgerCategory::BuildMod));
        assert!(fx.build_mods.is_empty());
        assert_eq!(fx.registry.by_index(0).unwrap().num_steps, 2);
    }

    #[test]
    fn test_recount_is_idempotent() {
        let mut fx = Fixture::new();
        model(
            &mut fx.registry,
            "main.ldr",
            &format!(
                "1 1 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n0 STEP\n0 !LPUB BUILD_MOD BEGIN k\n{BRICK}\n0 !LPUB BUILD_MOD END_MOD\n0 !LPUB BUILD_MOD END\n0 STEP\n0 !LPUB BUILD_MOD REMOVE k\n0 STEP"
            ),
        );
        model(&mut fx.registry, "sub.ldr", &format!("{BRICK}\n0 STEP\n{BRICK}"));
        fx.count();
        let steps = fx.steps.clone();
        let attributes = fx.build_mods.attributes("k");
        let instances: Vec<_> = fx.registry.iter().map(|m| m.instances).collect();

        fx.count();
        assert_eq!(fx.steps, steps);
        assert_eq!(fx.build_mods.attributes("k"), attributes);
        assert_eq!(
            fx.registry.iter().map(|m| m.instances).collect::<Vec<_>>(),
            instances
        );
        assert_eq!(
            fx.build_mods.build_mod_step_action(steps.len() - 1, "k"),
            Some(BuildModAction::Remove)
        );
    }
}
