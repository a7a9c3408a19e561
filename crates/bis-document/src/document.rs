//! The document facade.
//!
//! A [`Document`] owns every piece of engine state for one open file and is
//! the only mutable surface: the registry, the step index, the build-mod
//! store, the viewer cache and the ledger change only through its methods,
//! which keep them consistent with each other.
//!
//! Loading swaps in the result of [`parse_document`] wholesale and runs a
//! counting pass. Line edits shift the step index and build-mod line
//! attributes in place and drop stale viewer steps. Edits that touch a step
//! boundary, a build-mod command, a reference or a callout also flag the
//! document for a full recount, see [`Document::needs_recount`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use serde::{Deserialize, Serialize};

use bis_model::{
    ActionPolicy, BuildModAction, BuildModAttribute, BuildModAttributes, ColourDefinition, Ledger,
    LedgerCategory, LineType, MetaCommand, Severity, StepPos, SubModelSource, ViewerStepKey,
    normalize_name,
};

use crate::build_mod::BuildModStore;
use crate::config::DocumentConfig;
use crate::counter::{CountReport, count_instances};
use crate::error::{DocumentError, Result};
use crate::loader::{
    FileLayout, ParsedDocument, Resolution, Substitution, check_extension, parse_document,
};
use crate::registry::{SubModel, SubModelRegistry};
use crate::services::{Services, report_entries};
use crate::step_index::StepIndex;
use crate::viewer::{StepContent, ViewerStep, ViewerStepCache};
use crate::writer;

/// Ledger categories written by the counting pass rather than the loader.
const COUNT_CATEGORIES: [LedgerCategory; 2] =
    [LedgerCategory::BuildMod, LedgerCategory::RecursiveReference];

/// Coarse cancellation flag for a load.
///
/// The flag is checked once the parse completes; a cancelled load discards
/// its result and leaves the document empty.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Which end of a step a line number is wanted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepLine {
    /// First line of the step.
    Top,
    /// Last line of the step: its STEP line, or the model's last line.
    Bottom,
}

/// What a successful load produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub path: PathBuf,
    pub submodels: usize,
    pub steps: usize,
    pub build_mods: usize,
    pub missing: usize,
    pub warnings: usize,
    pub errors: usize,
}

/// One open LDraw document.
#[derive(Debug)]
pub struct Document {
    config: DocumentConfig,
    services: Services,
    cancel: CancelToken,
    path: Option<PathBuf>,
    registry: SubModelRegistry,
    steps: StepIndex,
    build_mods: BuildModStore,
    viewer: ViewerStepCache,
    ledger: Ledger,
    layout: FileLayout,
    external: BTreeMap<PathBuf, FileLayout>,
    resolutions: BTreeMap<String, Resolution>,
    colours: Vec<ColourDefinition>,
    substitutions: Vec<Substitution>,
    needs_recount: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DocumentConfig::default(), Services::default())
    }
}

impl Document {
    pub fn new(config: DocumentConfig, services: Services) -> Self {
        Self {
            config,
            services,
            cancel: CancelToken::new(),
            path: None,
            registry: SubModelRegistry::new(),
            steps: StepIndex::new(),
            build_mods: BuildModStore::new(),
            viewer: ViewerStepCache::new(),
            ledger: Ledger::new(),
            layout: FileLayout::default(),
            external: BTreeMap::new(),
            resolutions: BTreeMap::new(),
            colours: Vec::new(),
            substitutions: Vec::new(),
            needs_recount: false,
        }
    }

    /// Drop all content. Configuration and services are kept.
    pub fn empty(&mut self) {
        self.path = None;
        self.registry.empty();
        self.steps.clear();
        self.build_mods.clear();
        self.viewer.clear();
        self.ledger.clear();
        self.layout = FileLayout::default();
        self.external.clear();
        self.resolutions.clear();
        self.colours.clear();
        self.substitutions.clear();
        self.needs_recount = false;
    }

    // === Loading ===

    /// A token that cancels the next or the running load.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Load a document from disk, replacing the current content.
    ///
    /// The parse runs on a scoped worker thread. Any error, including a
    /// cancellation, leaves the document empty.
    pub fn load_file(&mut self, path: &Path) -> Result<LoadSummary> {
        self.cancel.reset();
        let parsed = self.parse_file(path);
        self.install(parsed, path)
    }

    /// Load a document from memory. `path` names it and locates its project directory.
    pub fn load_bytes(&mut self, bytes: &[u8], path: &Path) -> Result<LoadSummary> {
        self.cancel.reset();
        let parsed = parse_document(bytes, path, &self.config, &self.services);
        self.install(parsed, path)
    }

    fn parse_file(&self, path: &Path) -> Result<ParsedDocument> {
        check_extension(path)?;
        let bytes = fs::read(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let (config, services) = (&self.config, &self.services);
        let joined = thread::scope(|scope| {
            scope
                .spawn(|| parse_document(&bytes, path, config, services))
                .join()
        });
        let parsed = joined.map_err(|_| DocumentError::TaskFailed {
            path: path.to_path_buf(),
        })??;

        if self.cancel.is_cancelled() {
            return Err(DocumentError::Cancelled {
                path: path.to_path_buf(),
            });
        }
        Ok(parsed)
    }

    fn install(&mut self, parsed: Result<ParsedDocument>, path: &Path) -> Result<LoadSummary> {
        self.empty();
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "load failed");
                return Err(err);
            }
        };

        self.path = Some(path.to_path_buf());
        self.registry = parsed.registry;
        self.ledger = parsed.ledger;
        self.layout = parsed.layout;
        self.external = parsed.external;
        self.resolutions = parsed.resolutions;
        self.colours = parsed.colours;
        self.substitutions = parsed.substitutions;
        self.count_instances();

        let summary = LoadSummary {
            path: path.to_path_buf(),
            submodels: self.registry.len(),
            steps: self.steps.len(),
            build_mods: self.build_mods.len(),
            missing: self.missing().len(),
            warnings: self.ledger.count(Severity::Warning),
            errors: self.ledger.count(Severity::Error),
        };
        tracing::info!(
            path = %path.display(),
            submodels = summary.submodels,
            steps = summary.steps,
            "document loaded"
        );
        Ok(summary)
    }

    // === Counting ===

    /// Rebuild counters, the step index and build-mod step rows.
    ///
    /// Ledger entries from the previous pass are replaced, so repeated
    /// passes over unchanged content leave the ledger as it was.
    pub fn count_instances(&mut self) -> CountReport {
        self.ledger
            .retain(|entry| !COUNT_CATEGORIES.contains(&entry.category));
        let missing = self.missing();
        let mut pass = Ledger::new();
        let report = count_instances(
            &mut self.registry,
            &mut self.steps,
            &mut self.build_mods,
            &mut pass,
            &missing,
        );
        report_entries(self.services.status.as_ref(), pass.iter());
        self.ledger.extend(pass);

        self.viewer.clear();
        self.needs_recount = false;
        report
    }

    /// Whether an edit touched a structural line since the last pass.
    pub fn needs_recount(&self) -> bool {
        self.needs_recount
    }

    // === Navigation ===

    /// Index of the step that contains `line` of `model`.
    pub fn top_of_step(&self, model: &str, line: usize) -> Option<usize> {
        let index = self.registry.index_of(model)?;
        self.steps.top_of_step(index, line)
    }

    /// Index of the step that starts exactly at `line` of `model`.
    pub fn step_index(&self, model: &str, line: usize) -> Option<usize> {
        let index = self.registry.index_of(model)?;
        self.steps.step_index(index, line)
    }

    pub fn step(&self, step_index: usize) -> Result<StepPos> {
        self.steps
            .get(step_index)
            .ok_or(DocumentError::StepOutOfRange {
                index: step_index,
                len: self.steps.len(),
            })
    }

    /// Line number of the top or bottom of a step, within its model.
    pub fn build_mod_step_line_number(&self, step_index: usize, which: StepLine) -> Result<usize> {
        let pos = self.step(step_index)?;
        Ok(match which {
            StepLine::Top => pos.line_number,
            StepLine::Bottom => self.step_bottom(step_index, pos),
        })
    }

    fn step_bottom(&self, step_index: usize, pos: StepPos) -> usize {
        match self.steps.next_in_model(step_index).and_then(|i| self.steps.get(i)) {
            Some(next) => next.line_number.saturating_sub(1),
            None => self
                .registry
                .by_index(pos.model_index)
                .map_or(pos.line_number, |m| m.line_count().saturating_sub(1)),
        }
    }

    /// Viewer key of a step: its position plus its 1-based number in the model.
    pub fn viewer_step_key(&self, step_index: usize) -> Option<ViewerStepKey> {
        let pos = self.steps.get(step_index)?;
        let number = self
            .steps
            .steps_of(pos.model_index)
            .iter()
            .position(|&i| i == step_index)?
            + 1;
        Some(ViewerStepKey::new(pos.model_index, pos.line_number, number))
    }

    // === Line edits ===

    pub fn insert_line(&mut self, model: &str, line: usize, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let structural = is_structural(&text);
        let index = self.registry.insert_line(model, line, text)?;
        self.steps.shift_lines(index, line, 1);
        self.build_mods.shift_lines(index, line, 1);
        self.after_edit(index, line, structural);
        Ok(())
    }

    /// Replace one line, returning the previous text.
    pub fn replace_line(
        &mut self,
        model: &str,
        line: usize,
        text: impl Into<String>,
    ) -> Result<String> {
        let text = text.into();
        let structural = is_structural(&text);
        let (index, previous) = self.registry.replace_line(model, line, text)?;
        self.after_edit(index, line, structural || is_structural(&previous));
        Ok(previous)
    }

    /// Delete one line, returning its text.
    pub fn delete_line(&mut self, model: &str, line: usize) -> Result<String> {
        let (index, removed) = self.registry.delete_line(model, line)?;
        self.steps.splice_lines(index, line, 1, 0);
        self.build_mods.splice_lines(index, line, 1, 0);
        self.after_edit(index, line, is_structural(&removed));
        Ok(removed)
    }

    /// Replace `remove` lines starting at `at` with `lines`, returning the removed lines.
    pub fn change_contents(
        &mut self,
        model: &str,
        at: usize,
        remove: usize,
        lines: Vec<String>,
    ) -> Result<Vec<String>> {
        let added = lines.len();
        let mut structural = lines.iter().any(|line| is_structural(line));
        let (index, removed) = self.registry.change_contents(model, at, remove, lines)?;
        structural |= removed.iter().any(|line| is_structural(line));

        if added != remove {
            self.steps.splice_lines(index, at, remove, added);
            self.build_mods.splice_lines(index, at, remove, added);
        }
        self.after_edit(index, at, structural);
        Ok(removed)
    }

    /// Replace every line of a submodel.
    pub fn set_contents(&mut self, model: &str, lines: Vec<String>) -> Result<()> {
        let index = self.registry.set_contents(model, lines)?;
        self.after_edit(index, 0, true);
        Ok(())
    }

    fn after_edit(&mut self, model_index: usize, line: usize, structural: bool) {
        let top = self
            .steps
            .top_of_step(model_index, line)
            .and_then(|i| self.steps.get(i))
            .map_or(0, |pos| pos.line_number);
        self.viewer.invalidate_from(model_index, top);
        if structural {
            self.needs_recount = true;
        }
    }

    /// Add a submodel created in memory. It is saved into the main file.
    pub fn insert_submodel(&mut self, name: &str, lines: Vec<String>) -> usize {
        let mut model = SubModel::new(name, lines).with_source(SubModelSource::Generated);
        model.flags.generated = true;
        model.flags.changed_since_write = true;
        let index = self.registry.insert_model(model);
        self.resolutions
            .insert(normalize_name(name), Resolution::SubModel);
        self.needs_recount = true;
        index
    }

    // === Build modifications ===

    /// Create a build mod or merge attributes into an existing one.
    ///
    /// Returns `true` when a build mod was created.
    pub fn insert_build_mod(
        &mut self,
        key: &str,
        attributes: BuildModAttributes,
        step_index: usize,
    ) -> bool {
        let created = self.build_mods.insert_build_mod(key, attributes, step_index);
        if created
            && let Some(model) = attributes
                .get(BuildModAttribute::ModelIndex)
                .and_then(|i| self.registry.by_index_mut(i))
        {
            model.build_mod_count += 1;
        }
        created
    }

    /// Record an action for `key` at `step_index`. Unknown keys are ignored.
    pub fn set_build_mod_action(
        &mut self,
        key: &str,
        step_index: usize,
        action: BuildModAction,
    ) -> bool {
        if !self.build_mods.set_build_mod_action(key, step_index, action) {
            return false;
        }
        self.invalidate_build_mod(key);
        true
    }

    /// Delete a build mod and every step row it owns.
    pub fn delete_build_mod(&mut self, key: &str) -> bool {
        self.invalidate_build_mod(key);
        let Some(removed) = self.build_mods.delete_build_mod(key) else {
            tracing::warn!(key, "delete of unknown build mod ignored");
            return false;
        };
        if let Some(model) = removed
            .model_index()
            .and_then(|i| self.registry.by_index_mut(i))
        {
            model.build_mod_count = model.build_mod_count.saturating_sub(1);
        }
        true
    }

    fn invalidate_build_mod(&mut self, key: &str) {
        let Some(build_mod) = self.build_mods.get(key) else {
            return;
        };
        let stack = build_mod.submodel_stack.clone();
        if let Some(index) = build_mod.model_index() {
            let from = build_mod
                .attributes
                .get(BuildModAttribute::ModelLine)
                .unwrap_or(0);
            self.viewer.invalidate_from(index, from);
        }
        for name in &stack {
            if let Some(model) = self.registry.get_mut(name) {
                model.rendered.clear();
            }
        }
    }

    /// The action of `key` at `step_index`; an unresolved lookup records Apply.
    pub fn build_mod_action(
        &mut self,
        key: &str,
        step_index: usize,
        policy: ActionPolicy,
    ) -> Option<BuildModAction> {
        self.build_mods.build_mod_action(key, step_index, policy)
    }

    pub fn build_mod_step_action(&self, step_index: usize, key: &str) -> Option<BuildModAction> {
        self.build_mods.build_mod_step_action(step_index, key)
    }

    pub fn set_build_mod_rendered(&mut self, key: &str, model: &str) {
        self.build_mods.set_rendered(key, model);
    }

    // === Viewer ===

    /// Compose and cache the viewer content of a step.
    pub fn build_viewer_step(&mut self, step_index: usize) -> Result<&ViewerStep> {
        let pos = self.step(step_index)?;
        let key = self
            .viewer_step_key(step_index)
            .ok_or(DocumentError::StepOutOfRange {
                index: step_index,
                len: self.steps.len(),
            })?;
        let bottom = self.step_bottom(step_index, pos);
        let model = self
            .registry
            .by_index(pos.model_index)
            .ok_or_else(|| DocumentError::UnknownSubModel {
                name: format!("#{}", pos.model_index),
            })?;

        let content = StepContent {
            contents: &model.contents,
            top: pos.line_number,
            bottom,
            step_index,
        };
        let step = content.compose(key.clone(), &mut self.build_mods);
        self.viewer.insert(step);
        self.viewer
            .get(&key)
            .ok_or(DocumentError::StepOutOfRange {
                index: step_index,
                len: self.steps.len(),
            })
    }

    /// Replace cached content; returns whether it changed.
    pub fn update_viewer_step(
        &mut self,
        key: &ViewerStepKey,
        rotated: Vec<String>,
        unrotated: Vec<String>,
        viewer: Vec<String>,
    ) -> bool {
        self.viewer.update_viewer_step(key, rotated, unrotated, viewer)
    }

    pub fn viewer_step(&self, key: &ViewerStepKey) -> Option<&ViewerStep> {
        self.viewer.get(key)
    }

    // === Saving ===

    /// Lines of the main document as they would be saved.
    pub fn render_main(&self) -> Vec<String> {
        writer::render_main(&self.registry, &self.layout)
    }

    /// Save the main document to `path`, and changed external files when
    /// the configuration asks for it.
    pub fn save_file(&mut self, path: &Path) -> Result<()> {
        writer::write_lines(path, &self.render_main(), &self.layout)?;

        if self.config.write_external_files {
            for external in writer::changed_external_files(&self.registry) {
                let layout = self.external.get(&external).cloned().unwrap_or_default();
                let lines = writer::render_external(&self.registry, &external, &layout);
                writer::write_lines(&external, &lines, &layout)?;
                for model in self.registry.iter_mut().filter(
                    |m| matches!(&m.source, SubModelSource::External(p) if *p == external),
                ) {
                    model.flags.changed_since_write = false;
                    model.flags.modified = false;
                }
            }
        }

        self.registry.mark_written();
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    // === Accessors ===

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn registry(&self) -> &SubModelRegistry {
        &self.registry
    }

    pub fn submodel(&self, name: &str) -> Option<&SubModel> {
        self.registry.get(name)
    }

    pub fn steps(&self) -> &StepIndex {
        &self.steps
    }

    pub fn build_mods(&self) -> &BuildModStore {
        &self.build_mods
    }

    pub fn viewer(&self) -> &ViewerStepCache {
        &self.viewer
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    pub fn external_files(&self) -> impl Iterator<Item = &Path> {
        self.external.keys().map(PathBuf::as_path)
    }

    pub fn resolution(&self, name: &str) -> Option<&Resolution> {
        self.resolutions.get(&normalize_name(name))
    }

    /// Normalized names of unresolved references.
    pub fn missing(&self) -> BTreeSet<String> {
        self.resolutions
            .iter()
            .filter(|(_, resolution)| **resolution == Resolution::Missing)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn colours(&self) -> &[ColourDefinition] {
        &self.colours
    }

    pub fn substitutions(&self) -> &[Substitution] {
        &self.substitutions
    }

    /// Whether anything changed since the last save.
    pub fn is_modified(&self) -> bool {
        self.registry.iter().any(|m| m.flags.changed_since_write)
    }

    pub fn mark_rendered(&mut self, model: &str, key: impl Into<String>) -> Result<()> {
        self.registry.set_rendered(model, key)
    }
}

/// Lines whose edit changes step boundaries, patches or the model tree.
fn is_structural(line: &str) -> bool {
    match MetaCommand::parse(line) {
        Some(command) => {
            command.is_step_boundary()
                || matches!(
                    command,
                    MetaCommand::BuildMod { .. }
                        | MetaCommand::CalloutBegin
                        | MetaCommand::CalloutEnd
                        | MetaCommand::MultiStepBegin
                        | MetaCommand::MultiStepEnd
                )
        }
        None => LineType::of(line).is_ok_and(|line_type| line_type == LineType::Part),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::services::{StaticPieceLibrary, StatusSink};

    const CAR: &str = "0 Car\n0 Name: car.ldr\n0 Author: A\n0 !CATEGORY Car\n1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n0 STEP\n1 4 0 24 0 1 0 0 0 1 0 0 0 1 3001.dat\n0 STEP\n";

    fn services() -> Services {
        Services::default().with_library(Arc::new(StaticPieceLibrary::from_names(["3001.dat"])))
    }

    fn loaded(text: &str) -> Document {
        let mut document = Document::new(DocumentConfig::default(), services());
        document
            .load_bytes(text.as_bytes(), Path::new("car.ldr"))
            .unwrap();
        document
    }

    #[test]
    fn test_load_bytes_counts_steps() {
        let document = loaded(CAR);
        assert_eq!(document.steps().len(), 2);
        assert_eq!(document.submodel("car.ldr").unwrap().num_steps, 2);
        assert!(!document.needs_recount());
    }

    #[test]
    fn test_format_error_leaves_document_empty() {
        let mut document = loaded(CAR);
        let err = document
            .load_bytes(b"<html>", Path::new("bad.ldr"))
            .unwrap_err();
        assert!(err.is_fatal_load());
        assert!(document.registry().is_empty());
        assert!(document.path().is_none());
    }

    #[test]
    fn test_step_line_numbers() {
        let document = loaded(CAR);
        assert_eq!(document.build_mod_step_line_number(0, StepLine::Top).unwrap(), 0);
        assert_eq!(document.build_mod_step_line_number(0, StepLine::Bottom).unwrap(), 5);
        assert_eq!(document.build_mod_step_line_number(1, StepLine::Top).unwrap(), 6);
        assert_eq!(document.build_mod_step_line_number(1, StepLine::Bottom).unwrap(), 7);
        assert!(matches!(
            document.build_mod_step_line_number(9, StepLine::Top),
            Err(DocumentError::StepOutOfRange { index: 9, len: 2 })
        ));
    }

    #[test]
    fn test_viewer_step_key_numbers_steps_per_model() {
        let document = loaded(CAR);
        let key = document.viewer_step_key(1).unwrap();
        assert_eq!(key, ViewerStepKey::new(0, 6, 2));
        assert!(document.viewer_step_key(2).is_none());
    }

    #[test]
    fn test_insert_line_shifts_steps_and_flags_recount() {
        let mut document = loaded(CAR);
        document
            .insert_line("car.ldr", 5, "1 4 0 48 0 1 0 0 0 1 0 0 0 1 3001.dat")
            .unwrap();
        assert_eq!(document.steps().get(1), Some(StepPos::new(0, 7)));
        assert!(document.needs_recount());
        assert!(document.submodel("car.ldr").unwrap().flags.modified);
    }

    #[test]
    fn test_comment_edit_does_not_need_recount() {
        let mut document = loaded(CAR);
        let previous = document.replace_line("car.ldr", 0, "0 Red car").unwrap();
        assert_eq!(previous, "0 Car");
        assert!(!document.needs_recount());
        assert!(document.is_modified());
    }

    #[test]
    fn test_edit_drops_viewer_steps_from_the_edited_step() {
        let mut document = loaded(CAR);
        document.build_viewer_step(0).unwrap();
        document.build_viewer_step(1).unwrap();
        assert_eq!(document.viewer().len(), 2);

        document.replace_line("car.ldr", 6, "1 1 0 24 0 1 0 0 0 1 0 0 0 1 3001.dat").unwrap();
        assert_eq!(document.viewer().len(), 1);
        assert!(document.viewer_step(&ViewerStepKey::new(0, 0, 1)).is_some());
    }

    #[test]
    fn test_delete_line_out_of_range() {
        let mut document = loaded(CAR);
        assert!(matches!(
            document.delete_line("car.ldr", 99),
            Err(DocumentError::LineOutOfRange { .. })
        ));
        assert!(matches!(
            document.delete_line("nope.ldr", 0),
            Err(DocumentError::UnknownSubModel { .. })
        ));
    }

    #[test]
    fn test_build_mod_counter_follows_create_and_delete() {
        let mut document = loaded(CAR);
        let attributes = BuildModAttributes::new().with(BuildModAttribute::ModelIndex, 0);
        assert!(document.insert_build_mod("Door", attributes, 1));
        assert!(!document.insert_build_mod("door", attributes, 1));
        assert_eq!(document.submodel("car.ldr").unwrap().build_mod_count, 1);

        assert!(document.delete_build_mod("DOOR"));
        assert!(!document.delete_build_mod("DOOR"));
        assert_eq!(document.submodel("car.ldr").unwrap().build_mod_count, 0);
    }

    /// Cancels the document's token from the progress callback once armed.
    #[derive(Default)]
    struct CancelOnProgress {
        armed: AtomicBool,
        token: Mutex<Option<CancelToken>>,
    }

    impl StatusSink for CancelOnProgress {
        fn report(&self, _severity: Severity, _category: LedgerCategory, _text: &str) {}

        fn progress(&self, _done: usize, _total: usize) {
            if self.armed.load(Ordering::SeqCst)
                && let Some(token) = self.token.lock().unwrap().as_ref()
            {
                token.cancel();
            }
        }
    }

    #[test]
    fn test_cancel_during_load_resets_document() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("car.ldr");
        let second = dir.path().join("van.ldr");
        fs::write(&first, CAR).unwrap();
        fs::write(&second, CAR.replace("car.ldr", "van.ldr")).unwrap();

        let sink = Arc::new(CancelOnProgress::default());
        let mut document =
            Document::new(DocumentConfig::default(), services().with_status(sink.clone()));
        *sink.token.lock().unwrap() = Some(document.cancel_token());
        document.load_file(&first).unwrap();
        assert_eq!(document.steps().len(), 2);

        sink.armed.store(true, Ordering::SeqCst);
        let err = document.load_file(&second).unwrap_err();
        assert!(matches!(err, DocumentError::Cancelled { ref path } if *path == second));
        assert!(err.is_fatal_load());
        assert!(document.registry().is_empty());
        assert!(document.steps().is_empty());
        assert!(document.path().is_none());

        // The next load starts with a fresh flag.
        sink.armed.store(false, Ordering::SeqCst);
        let summary = document.load_file(&second).unwrap();
        assert_eq!(summary.steps, 2);
        assert!(document.submodel("van.ldr").is_some());
    }

    #[test]
    fn test_multi_line_change_matches_recount() {
        let text = "0 S\n0 Name: s.ldr\n0 Author: T\n0 !CATEGORY X\n1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n0 // a\n0 // b\n0 STEP\n1 4 0 24 0 1 0 0 0 1 0 0 0 1 3001.dat\n0 STEP\n";
        let mut document = Document::new(DocumentConfig::default(), services());
        document
            .load_bytes(text.as_bytes(), Path::new("s.ldr"))
            .unwrap();
        assert_eq!(document.steps().entries(), [StepPos::new(0, 0), StepPos::new(0, 8)]);

        let removed = document
            .change_contents("s.ldr", 5, 3, vec!["0 STEP".to_string()])
            .unwrap();
        assert_eq!(removed, ["0 // a", "0 // b", "0 STEP"]);
        let incremental = document.steps().clone();

        document.count_instances();
        assert_eq!(document.steps(), &incremental);
        assert_eq!(incremental.entries(), [StepPos::new(0, 0), StepPos::new(0, 6)]);
    }

    #[test]
    fn test_recount_keeps_edit_flags_until_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut document = loaded(CAR);
        document.replace_line("car.ldr", 0, "0 Blue car").unwrap();
        document.count_instances();
        assert!(document.submodel("car.ldr").unwrap().flags.modified);
        assert!(document.is_modified());

        document.save_file(&dir.path().join("car.ldr")).unwrap();
        assert!(!document.submodel("car.ldr").unwrap().flags.modified);
        assert!(!document.is_modified());
    }

    #[test]
    fn test_generated_submodel_is_saved_into_main() {
        let mut document = loaded(CAR);
        document.insert_submodel("extra.ldr", vec!["0 Extra".to_string()]);
        let lines = document.render_main();
        assert_eq!(&lines[lines.len() - 4..], ["0 FILE extra.ldr", "0 Extra", "0 NOFILE", ""]);
        assert!(document.needs_recount());
    }

    #[test]
    fn test_is_structural() {
        assert!(is_structural("0 STEP"));
        assert!(is_structural("0 ROTSTEP 0 0 0 ABS"));
        assert!(is_structural("0 !LPUB BUILD_MOD BEGIN door"));
        assert!(is_structural("0 !LPUB CALLOUT BEGIN"));
        assert!(is_structural("1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat"));
        assert!(!is_structural("0 // note"));
        assert!(!is_structural("2 24 0 0 0 1 1 1"));
    }
}
