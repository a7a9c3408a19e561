//! Global step index.
//!
//! Every counted step of every submodel, in the order a reader meets them
//! when walking the model depth-first from the top-level file. A step of a
//! nested submodel appears at the point the submodel is first placed, so the
//! sequence is ordered per model but not globally.

use serde::{Deserialize, Serialize};

use bis_model::StepPos;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepIndex {
    entries: Vec<StepPos>,
}

impl StepIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, index: usize) -> Option<StepPos> {
        self.entries.get(index).copied()
    }

    pub fn entries(&self) -> &[StepPos] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepPos> {
        self.entries.iter()
    }

    /// Append a step. A duplicate position is ignored and its existing index
    /// returned.
    pub fn push(&mut self, pos: StepPos) -> usize {
        if let Some(existing) = self.position(pos) {
            tracing::trace!(%pos, existing, "step already indexed");
            return existing;
        }
        self.entries.push(pos);
        self.entries.len() - 1
    }

    fn position(&self, pos: StepPos) -> Option<usize> {
        self.entries.iter().position(|entry| *entry == pos)
    }

    /// Exact lookup of the step that starts at `line` in `model`.
    ///
    /// While the index is still empty the first step of the top-level model
    /// (model 0) is reported as step 0, which lets the first counting pass
    /// consult the index before it has been built.
    pub fn step_index(&self, model_index: usize, line_number: usize) -> Option<usize> {
        if self.entries.is_empty() {
            return (model_index == 0).then_some(0);
        }
        self.position(StepPos::new(model_index, line_number))
    }

    /// The step containing `line` in `model`.
    ///
    /// Returns the greatest index whose entry belongs to `model` and starts
    /// at or before `line`. Lines inside a step resolve to that step.
    pub fn top_of_step(&self, model_index: usize, line_number: usize) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find(|(_, entry)| entry.model_index == model_index && entry.line_number <= line_number)
            .map(|(index, _)| index)
    }

    /// Step indexes belonging to one model, in order.
    pub fn steps_of(&self, model_index: usize) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.model_index == model_index)
            .map(|(index, _)| index)
            .collect()
    }

    /// The step after `index` in the same model, if any.
    pub fn next_in_model(&self, index: usize) -> Option<usize> {
        let model = self.entries.get(index)?.model_index;
        self.entries
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, entry)| entry.model_index == model)
            .map(|(next, _)| next)
    }

    /// Move entries of `model` that start below `after` by `delta` lines.
    ///
    /// Used for single-line edits. Entries pushed above `after` by a
    /// negative delta stop at `after`.
    pub fn shift_lines(&mut self, model_index: usize, after: usize, delta: isize) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|entry| entry.model_index == model_index && entry.line_number > after)
        {
            let shifted = entry.line_number.saturating_add_signed(delta);
            entry.line_number = shifted.max(after);
        }
        self.dedup();
    }

    /// Adjust entries of `model` after `removed` lines at `at` were replaced
    /// by `added` lines.
    ///
    /// Steps starting at or below the end of the removed range move by the
    /// size difference. Steps that started inside the range collapse onto `at`.
    pub fn splice_lines(&mut self, model_index: usize, at: usize, removed: usize, added: usize) {
        let end = at + removed;
        for entry in self
            .entries
            .iter_mut()
            .filter(|entry| entry.model_index == model_index && entry.line_number >= at)
        {
            entry.line_number = if entry.line_number >= end {
                entry.line_number - removed + added
            } else {
                at
            };
        }
        self.dedup();
    }

    // Collapsed steps keep their first occurrence.
    fn dedup(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.entries.retain(|entry| seen.insert(*entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StepIndex {
        // main step 0 places sub (model 1) which has two steps.
        let mut index = StepIndex::new();
        index.push(StepPos::new(1, 0));
        index.push(StepPos::new(1, 4));
        index.push(StepPos::new(0, 0));
        index.push(StepPos::new(0, 6));
        index
    }

    #[test]
    fn test_empty_index_reports_top_level() {
        let index = StepIndex::new();
        assert_eq!(index.step_index(0, 0), Some(0));
        assert_eq!(index.step_index(0, 12), Some(0));
        assert_eq!(index.step_index(1, 0), None);
    }

    #[test]
    fn test_exact_lookup() {
        let index = sample();
        assert_eq!(index.step_index(1, 4), Some(1));
        assert_eq!(index.step_index(0, 6), Some(3));
        assert_eq!(index.step_index(0, 5), None);
    }

    #[test]
    fn test_top_of_step_scans_backward() {
        let index = sample();
        assert_eq!(index.top_of_step(0, 3), Some(2));
        assert_eq!(index.top_of_step(0, 6), Some(3));
        assert_eq!(index.top_of_step(0, 40), Some(3));
        assert_eq!(index.top_of_step(1, 3), Some(0));
        assert_eq!(index.top_of_step(2, 0), None);
    }

    #[test]
    fn test_push_rejects_duplicates() {
        let mut index = sample();
        assert_eq!(index.push(StepPos::new(0, 0)), 2);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_next_in_model() {
        let index = sample();
        assert_eq!(index.next_in_model(0), Some(1));
        assert_eq!(index.next_in_model(1), None);
        assert_eq!(index.next_in_model(2), Some(3));
    }

    #[test]
    fn test_shift_lines_on_insert_and_delete() {
        let mut index = sample();
        index.shift_lines(0, 2, 3);
        assert_eq!(index.get(3), Some(StepPos::new(0, 9)));
        assert_eq!(index.get(0), Some(StepPos::new(1, 0)));

        index.shift_lines(0, 0, -9);
        assert_eq!(index.steps_of(0), vec![2]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_splice_moves_steps_below_the_range() {
        let mut index = sample();
        // Lines 2..5 of main become a single line.
        index.splice_lines(0, 2, 3, 1);
        assert_eq!(index.get(3), Some(StepPos::new(0, 4)));
        assert_eq!(index.get(2), Some(StepPos::new(0, 0)));
        assert_eq!(index.get(1), Some(StepPos::new(1, 4)));
    }

    #[test]
    fn test_splice_collapses_steps_inside_the_range() {
        let mut index = sample();
        index.splice_lines(1, 1, 4, 0);
        assert_eq!(index.steps_of(1), vec![0, 1]);
        assert_eq!(index.get(1), Some(StepPos::new(1, 1)));

        index.splice_lines(1, 0, 2, 0);
        assert_eq!(index.steps_of(1), vec![0]);
        assert_eq!(index.get(0), Some(StepPos::new(1, 0)));
    }
}
