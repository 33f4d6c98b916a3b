//! Permission resolution: which menu nodes a role sees, and what the editor shows.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::hierarchy::{ancestors, parent_map};
use super::selection::SelectionState;
use super::tree::{MenuForest, MenuTree, build_tree};
use super::{MenuError, MenuResult};
use crate::storage::{AssignmentStore, MenuStore, PermissionStorage, RoleStore};

/// Editor-mode view of one role.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorView {
    /// The full tree, disabled and button nodes included.
    pub tree: Vec<MenuTree>,
    /// Assigned ids exactly as stored.
    pub assigned_ids: BTreeSet<i64>,
}

/// Editor view plus the derived tri-state selection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSummary {
    #[serde(flatten)]
    pub view: EditorView,
    pub checked_ids: BTreeSet<i64>,
    pub indeterminate_ids: BTreeSet<i64>,
}

/// Resolves menu trees for roles against a storage backend.
#[derive(Clone)]
pub struct PermissionResolver {
    storage: Arc<dyn PermissionStorage>,
}

impl PermissionResolver {
    pub fn new(storage: Arc<dyn PermissionStorage>) -> Self {
        Self { storage }
    }

    /// Navigation mode.
    ///
    /// Enabled nodes that are assigned, plus every enabled ancestor of an
    /// assigned node. A disabled role sees nothing. An assigned node whose
    /// ancestor is disabled surfaces as a root.
    pub async fn resolve_for_role(&self, role_id: i64) -> MenuResult<Vec<MenuTree>> {
        let role = self
            .storage
            .find_role(role_id)
            .await?
            .ok_or_else(|| MenuError::role_not_found(role_id))?;
        if !role.enabled {
            debug!(role_id, "disabled role resolves to empty navigation");
            return Ok(Vec::new());
        }

        let assigned = self.storage.assigned_menu_ids(role_id).await?;
        if assigned.is_empty() {
            return Ok(Vec::new());
        }

        let enabled = self.storage.list_enabled().await?;
        let parents = parent_map(&enabled);

        let mut visible = BTreeSet::new();
        for id in assigned.iter().copied().filter(|id| parents.contains_key(id)) {
            visible.insert(id);
            visible.extend(ancestors(&parents, id));
        }

        let nodes = enabled
            .into_iter()
            .filter(|node| visible.contains(&node.id))
            .collect();
        Ok(build_tree(nodes))
    }

    /// Every node, unfiltered.
    pub async fn resolve_full(&self) -> MenuResult<Vec<MenuTree>> {
        Ok(build_tree(self.storage.list_all().await?))
    }

    /// Editor mode: the full tree and the raw assigned set.
    pub async fn resolve_for_editing(&self, role_id: i64) -> MenuResult<EditorView> {
        let assigned_ids = self.storage.assigned_menu_ids(role_id).await?;
        let tree = self.resolve_full().await?;
        Ok(EditorView { tree, assigned_ids })
    }

    /// Editor mode with checked and indeterminate ids derived server-side.
    pub async fn editor_summary(&self, role_id: i64) -> MenuResult<EditorSummary> {
        let assigned_ids = self.storage.assigned_menu_ids(role_id).await?;
        let forest = MenuForest::build(self.storage.list_all().await?);
        let selection = SelectionState::from_assigned(&forest, &assigned_ids);

        Ok(EditorSummary {
            checked_ids: selection.checked_ids(),
            indeterminate_ids: selection.indeterminate_ids(),
            view: EditorView {
                tree: forest.to_trees(),
                assigned_ids,
            },
        })
    }

    /// Replace a role's assignment and return the set as stored.
    pub async fn save_assignment(
        &self,
        role_id: i64,
        menu_ids: &BTreeSet<i64>,
    ) -> MenuResult<BTreeSet<i64>> {
        self.storage.replace_assignments(role_id, menu_ids).await?;
        self.storage.assigned_menu_ids(role_id).await
    }

    /// Check every live node, buttons included, and save.
    pub async fn select_all_and_save(&self, role_id: i64) -> MenuResult<BTreeSet<i64>> {
        if self.storage.find_role(role_id).await?.is_none() {
            return Err(MenuError::role_not_found(role_id));
        }
        let forest = MenuForest::build(self.storage.list_all().await?);
        let mut selection = SelectionState::new(&forest);
        selection.select_all();
        self.save_assignment(role_id, &selection.checked_ids()).await
    }
}
