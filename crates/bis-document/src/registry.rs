//! Submodel registry.
//!
//! Submodels are kept in load order in a `Vec` so a model index is a plain
//! O(1) lookup. A sorted map from lowercase name to index gives the
//! case-insensitive name lookup. The two never disagree: every write goes
//! through [`SubModelRegistry::insert`] or the line mutators.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use bis_model::{SubModelFlags, SubModelMeta, SubModelSource, UnofficialType, normalize_name};

use crate::error::{DocumentError, Result};

/// The lines that frame a submodel inside an MPD file.
///
/// Stored verbatim so an unmodified document saves byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Framing {
    /// `0 FILE <name>` or `0 !DATA <name>` as written.
    pub marker: String,
    /// `0 NOFILE` as written, if present.
    pub nofile: Option<String>,
    /// Lines between `0 NOFILE` and the next marker (usually blank).
    pub trailer: Vec<String>,
}

impl Framing {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            nofile: None,
            trailer: Vec::new(),
        }
    }
}

/// A named LDraw document inside the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubModel {
    /// Name with its original spelling.
    pub name: String,
    pub contents: Vec<String>,
    pub meta: SubModelMeta,
    pub unofficial: UnofficialType,
    pub flags: SubModelFlags,
    pub source: SubModelSource,
    /// MPD framing, `None` for LDR documents and generated models.
    pub framing: Option<Framing>,
    pub instances: usize,
    pub mirror_instances: usize,
    pub num_steps: usize,
    /// Load-order indexes of the submodels this one references.
    pub children: Vec<usize>,
    pub build_mod_count: usize,
    /// Keys of the renders produced from this model's current content.
    pub rendered: BTreeSet<String>,
}

impl SubModel {
    pub fn new(name: impl Into<String>, contents: Vec<String>) -> Self {
        Self {
            name: name.into(),
            contents,
            meta: SubModelMeta::default(),
            unofficial: UnofficialType::None,
            flags: SubModelFlags::default(),
            source: SubModelSource::Main,
            framing: None,
            instances: 0,
            mirror_instances: 0,
            num_steps: 0,
            children: Vec::new(),
            build_mod_count: 0,
            rendered: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: SubModelMeta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: SubModelSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = Some(framing);
        self
    }

    /// Lowercase lookup key.
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn line_count(&self) -> usize {
        self.contents.len()
    }

    /// Whether this model is written into the main document file.
    pub fn is_main(&self) -> bool {
        matches!(self.source, SubModelSource::Main | SubModelSource::Generated)
    }

    fn reset_counts(&mut self) {
        self.instances = 0;
        self.mirror_instances = 0;
        self.num_steps = 0;
        self.children.clear();
    }
}

/// Name-keyed store of submodels with stable load-order indexes.
#[derive(Debug, Clone, Default)]
pub struct SubModelRegistry {
    models: Vec<SubModel>,
    by_name: BTreeMap<String, usize>,
}

impl SubModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a submodel built from its name, lines and header metadata.
    pub fn insert(&mut self, name: &str, lines: Vec<String>, meta: SubModelMeta) -> usize {
        self.insert_model(SubModel::new(name, lines).with_meta(meta))
    }

    /// Insert a submodel, replacing any entry whose name matches ignoring case.
    ///
    /// A replacement takes over the load-order slot of the entry it replaces,
    /// so model indexes held elsewhere stay valid.
    pub fn insert_model(&mut self, model: SubModel) -> usize {
        let key = model.key();
        if let Some(&index) = self.by_name.get(&key) {
            tracing::debug!(name = %model.name, index, "replacing submodel");
            self.models[index] = model;
            return index;
        }
        let index = self.models.len();
        self.models.push(model);
        self.by_name.insert(key, index);
        index
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&SubModel> {
        self.index_of(name).map(|index| &self.models[index])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SubModel> {
        let index = self.index_of(name)?;
        self.models.get_mut(index)
    }

    pub fn by_index(&self, index: usize) -> Option<&SubModel> {
        self.models.get(index)
    }

    pub fn by_index_mut(&mut self, index: usize) -> Option<&mut SubModel> {
        self.models.get_mut(index)
    }

    /// The top-level model: the first one loaded.
    pub fn top_level(&self) -> Option<&SubModel> {
        self.models.first()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubModel> {
        self.models.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SubModel> {
        self.models.iter_mut()
    }

    /// Names in load order.
    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }

    /// Drop every submodel.
    pub fn empty(&mut self) {
        self.models.clear();
        self.by_name.clear();
    }

    /// Clear every counter ahead of a recount.
    pub fn reset_counts(&mut self) {
        for model in &mut self.models {
            model.reset_counts();
        }
    }

    // === Contents ===

    pub fn contents(&self, name: &str) -> Option<&[String]> {
        self.get(name).map(|m| m.contents.as_slice())
    }

    pub fn line(&self, name: &str, line: usize) -> Option<&str> {
        self.get(name)?.contents.get(line).map(String::as_str)
    }

    /// Replace every line of a submodel.
    pub fn set_contents(&mut self, name: &str, lines: Vec<String>) -> Result<usize> {
        let index = self.require(name)?;
        self.models[index].contents = lines;
        self.mark_modified(index);
        Ok(index)
    }

    pub fn insert_line(&mut self, name: &str, line: usize, text: impl Into<String>) -> Result<usize> {
        let index = self.require(name)?;
        self.check_range(index, line, true)?;
        self.models[index].contents.insert(line, text.into());
        self.mark_modified(index);
        Ok(index)
    }

    /// Replace one line, returning the model index and the previous text.
    pub fn replace_line(
        &mut self,
        name: &str,
        line: usize,
        text: impl Into<String>,
    ) -> Result<(usize, String)> {
        let index = self.require(name)?;
        self.check_range(index, line, false)?;
        let previous = std::mem::replace(&mut self.models[index].contents[line], text.into());
        self.mark_modified(index);
        Ok((index, previous))
    }

    /// Delete one line, returning the model index and the removed text.
    pub fn delete_line(&mut self, name: &str, line: usize) -> Result<(usize, String)> {
        let index = self.require(name)?;
        self.check_range(index, line, false)?;
        let removed = self.models[index].contents.remove(line);
        self.mark_modified(index);
        Ok((index, removed))
    }

    /// Replace `remove` lines starting at `at` with `lines`.
    ///
    /// Returns the model index and the removed lines.
    pub fn change_contents(
        &mut self,
        name: &str,
        at: usize,
        remove: usize,
        lines: Vec<String>,
    ) -> Result<(usize, Vec<String>)> {
        let index = self.require(name)?;
        let len = self.models[index].contents.len();
        let end = at.saturating_add(remove);
        if at > len || end > len {
            return Err(DocumentError::LineOutOfRange {
                name: name.to_string(),
                line: end.max(at),
                len,
            });
        }
        let removed = self.models[index]
            .contents
            .splice(at..end, lines)
            .collect();
        self.mark_modified(index);
        Ok((index, removed))
    }

    // === Modification tracking ===

    /// Indexes of every model that references `index`, directly or not.
    pub fn ancestors(&self, index: usize) -> Vec<usize> {
        let mut found = BTreeSet::new();
        let mut pending = vec![index];
        while let Some(current) = pending.pop() {
            for (parent, model) in self.models.iter().enumerate() {
                if model.children.contains(&current) && found.insert(parent) {
                    pending.push(parent);
                }
            }
        }
        found.remove(&index);
        found.into_iter().collect()
    }

    /// Flag a model and all its ancestors as modified and unsaved.
    ///
    /// Rendered keys are dropped along the way: their images show old content.
    pub fn mark_modified(&mut self, index: usize) {
        let mut touched = self.ancestors(index);
        touched.push(index);
        for i in touched {
            if let Some(model) = self.models.get_mut(i) {
                model.flags.modified = true;
                model.flags.changed_since_write = true;
                model.rendered.clear();
            }
        }
    }

    /// Clear the edit flags on every model written into the main file.
    pub fn mark_written(&mut self) {
        for model in self.models.iter_mut().filter(|m| m.is_main()) {
            model.flags.changed_since_write = false;
            model.flags.modified = false;
        }
    }

    // === Rendered state ===

    pub fn set_rendered(&mut self, name: &str, key: impl Into<String>) -> Result<()> {
        let index = self.require(name)?;
        self.models[index].rendered.insert(key.into());
        Ok(())
    }

    pub fn is_rendered(&self, name: &str, key: &str) -> bool {
        self.get(name).is_some_and(|m| m.rendered.contains(key))
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| DocumentError::UnknownSubModel {
                name: name.to_string(),
            })
    }

    fn check_range(&self, index: usize, line: usize, inclusive_end: bool) -> Result<()> {
        let model = &self.models[index];
        let len = model.contents.len();
        let in_range = if inclusive_end { line <= len } else { line < len };
        if in_range {
            Ok(())
        } else {
            Err(DocumentError::LineOutOfRange {
                name: model.name.clone(),
                line,
                len,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_insert_is_case_insensitive() {
        let mut registry = SubModelRegistry::new();
        let a = registry.insert("Car.ldr", lines(&["0 first"]), SubModelMeta::default());
        let b = registry.insert("CAR.LDR", lines(&["0 second"]), SubModelMeta::default());

        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("car.ldr").unwrap().name, "CAR.LDR");
        assert_eq!(registry.contents("car.ldr").unwrap(), ["0 second"]);
    }

    #[test]
    fn test_replacement_keeps_other_indexes() {
        let mut registry = SubModelRegistry::new();
        registry.insert("main.ldr", Vec::new(), SubModelMeta::default());
        registry.insert("wheel.ldr", Vec::new(), SubModelMeta::default());
        registry.insert("MAIN.ldr", Vec::new(), SubModelMeta::default());
        assert_eq!(registry.index_of("wheel.ldr"), Some(1));
        assert_eq!(registry.names(), ["MAIN.ldr", "wheel.ldr"]);
    }

    #[test]
    fn test_line_mutators_mark_modified() {
        let mut registry = SubModelRegistry::new();
        registry.insert("main.ldr", lines(&["0 a", "0 b"]), SubModelMeta::default());

        registry.insert_line("main.ldr", 2, "0 c").unwrap();
        let (_, previous) = registry.replace_line("main.ldr", 0, "0 A").unwrap();
        assert_eq!(previous, "0 a");
        let (_, removed) = registry.delete_line("main.ldr", 1).unwrap();
        assert_eq!(removed, "0 b");

        let model = registry.get("main.ldr").unwrap();
        assert_eq!(model.contents, ["0 A", "0 c"]);
        assert!(model.flags.modified);
        assert!(model.flags.changed_since_write);
    }

    #[test]
    fn test_change_contents_splices_range() {
        let mut registry = SubModelRegistry::new();
        registry.insert("m", lines(&["0 a", "0 b", "0 c"]), SubModelMeta::default());
        let (_, removed) = registry
            .change_contents("m", 1, 1, lines(&["0 x", "0 y"]))
            .unwrap();
        assert_eq!(removed, ["0 b"]);
        assert_eq!(registry.contents("m").unwrap(), ["0 a", "0 x", "0 y", "0 c"]);
        assert!(registry.change_contents("m", 3, 5, Vec::new()).is_err());
    }

    #[test]
    fn test_out_of_range_and_unknown() {
        let mut registry = SubModelRegistry::new();
        registry.insert("m", lines(&["0 a"]), SubModelMeta::default());
        assert!(matches!(
            registry.delete_line("m", 1),
            Err(DocumentError::LineOutOfRange { line: 1, len: 1, .. })
        ));
        assert!(matches!(
            registry.set_contents("nope", Vec::new()),
            Err(DocumentError::UnknownSubModel { .. })
        ));
    }

    #[test]
    fn test_modification_reaches_ancestors() {
        let mut registry = SubModelRegistry::new();
        registry.insert("main", Vec::new(), SubModelMeta::default());
        registry.insert("body", Vec::new(), SubModelMeta::default());
        registry.insert("door", lines(&["0 x"]), SubModelMeta::default());
        registry.insert("spare", Vec::new(), SubModelMeta::default());
        registry.by_index_mut(0).unwrap().children = vec![1];
        registry.by_index_mut(1).unwrap().children = vec![2];
        registry.set_rendered("main", "0;0;1").unwrap();

        registry.replace_line("door", 0, "0 y").unwrap();

        assert_eq!(registry.ancestors(2), vec![0, 1]);
        assert!(registry.get("main").unwrap().flags.modified);
        assert!(registry.get("body").unwrap().flags.modified);
        assert!(!registry.get("spare").unwrap().flags.modified);
        assert!(!registry.is_rendered("main", "0;0;1"));
    }
}
