//! Checkbox-tree widget adapter.
//!
//! Some tree widgets cache parent/child linkage and skip re-propagation after
//! a programmatic bulk `set_checked_keys`. [`WidgetBinding`] can follow the
//! bulk load with one synthetic off/on toggle to force the widget to relink.
//! The toggle targets a node whose state it cannot change, so the selection
//! being repaired stays intact:
//!
//! - Normally the target is the first branch (pre-order) that is fully
//!   checked or fully unchecked.
//! - When every branch is indeterminate, or the forest has no branches, the
//!   first leaf is toggled instead. A leaf toggle restores exactly but only
//!   re-propagates along that leaf's ancestor chain.
//! - An empty forest gets no toggle.
//!
//! Bindings over a compliant widget (such as [`SelectionState`]) leave the
//! workaround off.

use std::collections::BTreeSet;

use tracing::debug;

use super::selection::{CheckState, SelectionState};
use super::tree::MenuForest;

/// Minimal surface of a checkbox-tree component.
pub trait CheckboxTreeWidget {
    /// Programmatic bulk assignment of checked keys.
    fn set_checked_keys(&mut self, keys: &[i64]);

    /// Click-equivalent toggle; propagates down the subtree and up the ancestors.
    fn set_checked(&mut self, key: i64, checked: bool);

    /// Fully checked keys.
    fn checked_keys(&self) -> Vec<i64>;

    /// Partially checked keys.
    fn half_checked_keys(&self) -> Vec<i64>;
}

impl CheckboxTreeWidget for SelectionState<'_> {
    fn set_checked_keys(&mut self, keys: &[i64]) {
        self.load(keys.iter().copied());
    }

    fn set_checked(&mut self, key: i64, checked: bool) {
        if let Err(e) = self.toggle(key, checked) {
            debug!(key, error = %e, "ignoring toggle for unknown menu");
        }
    }

    fn checked_keys(&self) -> Vec<i64> {
        self.checked_ids().into_iter().collect()
    }

    fn half_checked_keys(&self) -> Vec<i64> {
        self.indeterminate_ids().into_iter().collect()
    }
}

/// Drives a widget through the editor lifecycle: load, toggle, save.
pub struct WidgetBinding<W> {
    widget: W,
    relink_after_bulk_set: bool,
}

impl<W: CheckboxTreeWidget> WidgetBinding<W> {
    /// Binding for a widget that propagates correctly after bulk loads.
    pub fn new(widget: W) -> Self {
        Self {
            widget,
            relink_after_bulk_set: false,
        }
    }

    /// Binding that applies the off/on relink toggle after every bulk load.
    pub fn with_relink(widget: W) -> Self {
        Self {
            widget,
            relink_after_bulk_set: true,
        }
    }

    /// Push a role's stored assignment into the widget.
    pub fn load(&mut self, forest: &MenuForest, assigned: &BTreeSet<i64>) {
        let keys: Vec<i64> = assigned
            .iter()
            .copied()
            .filter(|id| forest.contains(*id))
            .collect();
        self.widget.set_checked_keys(&keys);

        if self.relink_after_bulk_set {
            let expected = SelectionState::from_assigned(forest, assigned);
            if let Some((key, checked)) = relink_target(&expected) {
                debug!(key, checked, "relinking tree widget after bulk load");
                self.widget.set_checked(key, !checked);
                self.widget.set_checked(key, checked);
            }
        }
    }

    /// Forward a user toggle.
    pub fn toggle(&mut self, key: i64, checked: bool) {
        self.widget.set_checked(key, checked);
    }

    /// Check every node by checking every root.
    pub fn select_all(&mut self, forest: &MenuForest) {
        for root in forest.roots() {
            self.widget.set_checked(root.id(), true);
        }
    }

    /// The id set to persist: fully checked keys only.
    pub fn to_save(&self) -> BTreeSet<i64> {
        self.widget.checked_keys().into_iter().collect()
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn into_inner(self) -> W {
        self.widget
    }
}

/// Pick the node to toggle off and back on.
///
/// Prefers the first branch (pre-order) that is fully checked or fully
/// unchecked, since a deep toggle there restores exactly. Falls back to the
/// first leaf when no such branch exists (all branches indeterminate, or a
/// flat forest).
fn relink_target(expected: &SelectionState<'_>) -> Option<(i64, bool)> {
    let forest = expected.forest();
    let order = forest.pre_order();

    let branch = order.iter().copied().find(|&idx| {
        !forest.children_of(idx).is_empty()
            && expected.state(forest.node_at(idx).id) != Some(CheckState::Indeterminate)
    });
    let leaf = || {
        order
            .iter()
            .copied()
            .find(|&idx| forest.children_of(idx).is_empty())
    };

    branch.or_else(leaf).map(|idx| {
        let id = forest.node_at(idx).id;
        (id, expected.state(id) == Some(CheckState::Checked))
    })
}
