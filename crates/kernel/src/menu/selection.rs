//! Tri-state selection over a menu forest.
//!
//! Users only ever toggle a node to checked or unchecked. `Indeterminate` is
//! derived: a node with children is checked iff all children are checked,
//! indeterminate iff some descendant is checked, unchecked otherwise. Only
//! fully checked nodes are persisted on save.

use std::collections::BTreeSet;

use serde::Serialize;

use super::tree::MenuForest;
use super::{MenuError, MenuResult};

/// Display state of one checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    Unchecked,
    Checked,
    Indeterminate,
}

/// Selection state for one editing session.
#[derive(Debug, Clone)]
pub struct SelectionState<'f> {
    forest: &'f MenuForest,
    states: Vec<CheckState>,
}

impl<'f> SelectionState<'f> {
    /// Everything unchecked.
    pub fn new(forest: &'f MenuForest) -> Self {
        Self {
            forest,
            states: vec![CheckState::Unchecked; forest.len()],
        }
    }

    /// Initial state from a role's stored assignment.
    ///
    /// Marks each assigned node checked, then derives every parent once from
    /// its children. Ids not in the forest are ignored.
    pub fn from_assigned(forest: &'f MenuForest, assigned: &BTreeSet<i64>) -> Self {
        let mut state = Self::new(forest);
        state.load(assigned.iter().copied());
        state
    }

    /// Replace the whole selection with `ids` and re-derive parents.
    pub(crate) fn load(&mut self, ids: impl IntoIterator<Item = i64>) {
        self.states.fill(CheckState::Unchecked);
        for id in ids {
            if let Some(idx) = self.forest.index_of(id) {
                self.states[idx] = CheckState::Checked;
            }
        }
        self.recompute_all();
    }

    /// The forest this selection covers.
    pub fn forest(&self) -> &'f MenuForest {
        self.forest
    }

    /// State of `id`, if it is in the forest.
    pub fn state(&self, id: i64) -> Option<CheckState> {
        self.forest.index_of(id).map(|idx| self.states[idx])
    }

    /// Apply a user toggle on `id`.
    ///
    /// The node and its whole subtree take the new value; ancestors are then
    /// re-derived bottom-up.
    pub fn toggle(&mut self, id: i64, checked: bool) -> MenuResult<()> {
        let idx = self
            .forest
            .index_of(id)
            .ok_or_else(|| MenuError::menu_not_found(id))?;
        let value = if checked {
            CheckState::Checked
        } else {
            CheckState::Unchecked
        };

        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            self.states[i] = value;
            stack.extend(self.forest.children_of(i).iter().copied());
        }

        let mut current = self.forest.parent_of(idx);
        while let Some(p) = current {
            self.states[p] = self.derive(p);
            current = self.forest.parent_of(p);
        }
        Ok(())
    }

    /// Check every node, buttons included.
    pub fn select_all(&mut self) {
        self.states.fill(CheckState::Checked);
    }

    /// Uncheck every node.
    pub fn clear_all(&mut self) {
        self.states.fill(CheckState::Unchecked);
    }

    /// Ids in the checked state: the set written on save.
    pub fn checked_ids(&self) -> BTreeSet<i64> {
        self.ids_in(CheckState::Checked)
    }

    /// Ids shown as partially selected. Never persisted.
    pub fn indeterminate_ids(&self) -> BTreeSet<i64> {
        self.ids_in(CheckState::Indeterminate)
    }

    fn ids_in(&self, wanted: CheckState) -> BTreeSet<i64> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == wanted)
            .map(|(idx, _)| self.forest.node_at(idx).id)
            .collect()
    }

    fn recompute_all(&mut self) {
        for idx in self.forest.post_order() {
            if !self.forest.children_of(idx).is_empty() {
                self.states[idx] = self.derive(idx);
            }
        }
    }

    fn derive(&self, idx: usize) -> CheckState {
        let children = self.forest.children_of(idx);
        if children.is_empty() {
            return self.states[idx];
        }
        let all_checked = children
            .iter()
            .all(|&c| self.states[c] == CheckState::Checked);
        if all_checked {
            return CheckState::Checked;
        }
        let any_selected = children
            .iter()
            .any(|&c| self.states[c] != CheckState::Unchecked);
        if any_selected {
            CheckState::Indeterminate
        } else {
            CheckState::Unchecked
        }
    }
}
