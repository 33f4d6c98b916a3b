//! In-memory storage backend.
//!
//! All three tables sit behind one `parking_lot::RwLock`, so every write runs
//! under a single write guard and is atomic with respect to readers.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{AssignmentStore, MenuStore, PermissionStorage, RoleStore, now};
use crate::menu::hierarchy::{check_parent, check_parent_kind, descendant_closure, parent_map};
use crate::menu::{MenuError, MenuResult};
use crate::models::{
    CreateMenuNode, CreateRole, MenuKind, MenuNode, Page, Role, RoleFilter, UpdateMenuNode,
    UpdateRole,
};

#[derive(Debug)]
struct Tables {
    menus: BTreeMap<i64, MenuNode>,
    roles: BTreeMap<i64, Role>,
    /// `(role_id, menu_id)` pairs.
    assignments: BTreeSet<(i64, i64)>,
    next_menu_id: i64,
    next_role_id: i64,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            menus: BTreeMap::new(),
            roles: BTreeMap::new(),
            assignments: BTreeSet::new(),
            next_menu_id: 1,
            next_role_id: 1,
        }
    }
}

impl Tables {
    fn ensure_code_free(&self, code: &str, except: Option<i64>) -> MenuResult<()> {
        let taken = self
            .roles
            .values()
            .any(|r| r.code == code && Some(r.id) != except);
        if taken {
            return Err(MenuError::Validation(format!(
                "role code '{code}' already exists"
            )));
        }
        Ok(())
    }

    fn has_children(&self, id: i64) -> bool {
        self.menus.values().any(|m| m.parent_id == Some(id))
    }
}

/// Process-local storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MenuStore for MemoryStorage {
    async fn list_all(&self) -> MenuResult<Vec<MenuNode>> {
        Ok(self.tables.read().menus.values().cloned().collect())
    }

    async fn list_enabled(&self) -> MenuResult<Vec<MenuNode>> {
        Ok(self
            .tables
            .read()
            .menus
            .values()
            .filter(|m| m.enabled)
            .cloned()
            .collect())
    }

    async fn find_menu(&self, id: i64) -> MenuResult<Option<MenuNode>> {
        Ok(self.tables.read().menus.get(&id).cloned())
    }

    async fn create_menu(&self, input: CreateMenuNode) -> MenuResult<MenuNode> {
        let mut t = self.tables.write();
        let node = input.into_node(t.next_menu_id, now());
        node.validate()?;

        if let Some(parent_id) = node.parent_id {
            let parent = t.menus.get(&parent_id).ok_or(MenuError::InvalidReference {
                ids: vec![parent_id],
            })?;
            check_parent_kind(parent)?;
        }

        t.next_menu_id += 1;
        t.menus.insert(node.id, node.clone());
        info!(menu_id = node.id, kind = %node.kind, "menu created");
        Ok(node)
    }

    async fn update_menu(&self, id: i64, patch: UpdateMenuNode) -> MenuResult<MenuNode> {
        let mut t = self.tables.write();
        let existing = t.menus.get(&id).ok_or_else(|| MenuError::menu_not_found(id))?;
        let updated = patch.apply_to(existing, now());
        updated.validate()?;

        if updated.parent_id != existing.parent_id {
            check_parent(&parent_map(t.menus.values()), id, updated.parent_id)?;
        }
        if let Some(parent_id) = updated.parent_id
            && let Some(parent) = t.menus.get(&parent_id)
        {
            check_parent_kind(parent)?;
        }
        if updated.kind == MenuKind::Button && t.has_children(id) {
            return Err(MenuError::InvalidHierarchy(format!(
                "menu {id} has children and cannot become a button"
            )));
        }

        t.menus.insert(id, updated.clone());
        info!(menu_id = id, parent_id = ?updated.parent_id, "menu updated");
        Ok(updated)
    }

    async fn delete_menu(&self, id: i64) -> MenuResult<Vec<i64>> {
        let mut t = self.tables.write();
        if !t.menus.contains_key(&id) {
            return Err(MenuError::menu_not_found(id));
        }

        let removed = descendant_closure(&parent_map(t.menus.values()), id);
        let before = t.assignments.len();
        t.assignments
            .retain(|(_, menu_id)| removed.binary_search(menu_id).is_err());
        let unassigned = before - t.assignments.len();
        for menu_id in &removed {
            t.menus.remove(menu_id);
        }

        info!(
            menu_id = id,
            removed = removed.len(),
            assignments = unassigned,
            "menu subtree deleted"
        );
        Ok(removed)
    }
}

#[async_trait]
impl RoleStore for MemoryStorage {
    async fn list_roles(&self, filter: &RoleFilter) -> MenuResult<Page<Role>> {
        let t = self.tables.read();
        let matching: Vec<&Role> = t.roles.values().filter(|r| filter.matches(r)).collect();
        let total = matching.len() as u64;
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(filter.page_size() as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            page: filter.page(),
            page_size: filter.page_size(),
        })
    }

    async fn find_role(&self, id: i64) -> MenuResult<Option<Role>> {
        Ok(self.tables.read().roles.get(&id).cloned())
    }

    async fn find_role_by_code(&self, code: &str) -> MenuResult<Option<Role>> {
        Ok(self
            .tables
            .read()
            .roles
            .values()
            .find(|r| r.code == code)
            .cloned())
    }

    async fn create_role(&self, input: CreateRole) -> MenuResult<Role> {
        let mut t = self.tables.write();
        let role = input.into_role(t.next_role_id, now());
        role.validate()?;
        t.ensure_code_free(&role.code, None)?;

        t.next_role_id += 1;
        t.roles.insert(role.id, role.clone());
        info!(role_id = role.id, code = %role.code, "role created");
        Ok(role)
    }

    async fn update_role(&self, id: i64, patch: UpdateRole) -> MenuResult<Role> {
        let mut t = self.tables.write();
        let existing = t.roles.get(&id).ok_or_else(|| MenuError::role_not_found(id))?;
        let updated = patch.apply_to(existing, now());
        updated.validate()?;
        t.ensure_code_free(&updated.code, Some(id))?;

        t.roles.insert(id, updated.clone());
        info!(role_id = id, "role updated");
        Ok(updated)
    }

    async fn delete_role(&self, id: i64) -> MenuResult<()> {
        let mut t = self.tables.write();
        if t.roles.remove(&id).is_none() {
            return Err(MenuError::role_not_found(id));
        }
        t.assignments.retain(|(role_id, _)| *role_id != id);
        info!(role_id = id, "role deleted");
        Ok(())
    }

    async fn toggle_role_enabled(&self, id: i64) -> MenuResult<Role> {
        let mut t = self.tables.write();
        let role = t
            .roles
            .get_mut(&id)
            .ok_or_else(|| MenuError::role_not_found(id))?;
        role.enabled = !role.enabled;
        role.changed = now();
        info!(role_id = id, enabled = role.enabled, "role status toggled");
        Ok(role.clone())
    }
}

#[async_trait]
impl AssignmentStore for MemoryStorage {
    async fn assigned_menu_ids(&self, role_id: i64) -> MenuResult<BTreeSet<i64>> {
        let t = self.tables.read();
        if !t.roles.contains_key(&role_id) {
            return Err(MenuError::role_not_found(role_id));
        }
        Ok(t.assignments
            .range((role_id, i64::MIN)..=(role_id, i64::MAX))
            .map(|(_, menu_id)| *menu_id)
            .collect())
    }

    async fn replace_assignments(&self, role_id: i64, menu_ids: &BTreeSet<i64>) -> MenuResult<()> {
        let mut t = self.tables.write();
        if !t.roles.contains_key(&role_id) {
            return Err(MenuError::role_not_found(role_id));
        }

        let missing: Vec<i64> = menu_ids
            .iter()
            .copied()
            .filter(|id| !t.menus.contains_key(id))
            .collect();
        if !missing.is_empty() {
            debug!(role_id, ?missing, "assignment rejected");
            return Err(MenuError::InvalidReference { ids: missing });
        }

        t.assignments.retain(|(r, _)| *r != role_id);
        t.assignments
            .extend(menu_ids.iter().map(|menu_id| (role_id, *menu_id)));
        info!(role_id, count = menu_ids.len(), "role menus replaced");
        Ok(())
    }
}

#[async_trait]
impl PermissionStorage for MemoryStorage {
    async fn ping(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn page(title: &str, parent: Option<i64>) -> CreateMenuNode {
        CreateMenuNode {
            parent_id: parent,
            kind: MenuKind::Page,
            title: title.into(),
            route_name: None,
            path: None,
            component: Some(format!("{}/index", title.to_lowercase())),
            permission_key: None,
            sort_rank: None,
            enabled: None,
        }
    }

    fn button(title: &str, parent: i64) -> CreateMenuNode {
        CreateMenuNode {
            kind: MenuKind::Button,
            component: None,
            permission_key: Some(format!("{}:do", title.to_lowercase())),
            ..page(title, Some(parent))
        }
    }

    fn role(code: &str) -> CreateRole {
        CreateRole {
            code: code.into(),
            name: code.to_uppercase(),
            enabled: None,
        }
    }

    fn set(ids: &[i64]) -> BTreeSet<i64> {
        ids.iter().copied().collect()
    }

    #[tokio::test]
    async fn ids_are_server_assigned() {
        let store = MemoryStorage::new();
        let a = store.create_menu(page("Home", None)).await.unwrap();
        let b = store.create_menu(page("Foods", Some(a.id))).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(b.parent_id, Some(1));
    }

    #[tokio::test]
    async fn create_rejects_missing_and_button_parents() {
        let store = MemoryStorage::new();
        assert!(matches!(
            store.create_menu(page("Orphan", Some(9))).await,
            Err(MenuError::InvalidReference { .. })
        ));

        let home = store.create_menu(page("Home", None)).await.unwrap();
        let del = store.create_menu(button("Delete", home.id)).await.unwrap();
        assert!(matches!(
            store.create_menu(page("Nested", Some(del.id))).await,
            Err(MenuError::InvalidHierarchy(_))
        ));
    }

    #[tokio::test]
    async fn failed_create_does_not_consume_an_id() {
        let store = MemoryStorage::new();
        let mut bad = page("Bad", None);
        bad.component = None;
        assert!(store.create_menu(bad).await.is_err());
        assert_eq!(store.create_menu(page("Good", None)).await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn two_node_cycle_is_rejected() {
        let store = MemoryStorage::new();
        let root = store.create_menu(page("Root", None)).await.unwrap();
        let a = store.create_menu(page("A", Some(root.id))).await.unwrap();
        let b = store.create_menu(page("B", Some(root.id))).await.unwrap();

        store
            .update_menu(a.id, UpdateMenuNode::reparent(Some(b.id)))
            .await
            .unwrap();
        let err = store
            .update_menu(b.id, UpdateMenuNode::reparent(Some(a.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, MenuError::InvalidHierarchy(_)));
        assert_eq!(store.find_menu(b.id).await.unwrap().unwrap().parent_id, Some(root.id));
    }

    #[tokio::test]
    async fn update_missing_menu_is_not_found() {
        let store = MemoryStorage::new();
        assert!(matches!(
            store.update_menu(5, UpdateMenuNode::default()).await,
            Err(MenuError::NotFound { entity: "menu", id: 5 })
        ));
    }

    #[tokio::test]
    async fn branch_cannot_become_button() {
        let store = MemoryStorage::new();
        let root = store.create_menu(page("Root", None)).await.unwrap();
        store.create_menu(page("Child", Some(root.id))).await.unwrap();
        let patch = UpdateMenuNode {
            kind: Some(MenuKind::Button),
            permission_key: Some(Some("root:x".into())),
            ..UpdateMenuNode::default()
        };
        assert!(matches!(
            store.update_menu(root.id, patch).await,
            Err(MenuError::InvalidHierarchy(_))
        ));
    }

    #[tokio::test]
    async fn delete_cascades_to_descendants_and_assignments() {
        let store = MemoryStorage::new();
        let root = store.create_menu(page("Root", None)).await.unwrap();
        let child = store.create_menu(page("Child", Some(root.id))).await.unwrap();
        let leaf = store.create_menu(button("Leaf", child.id)).await.unwrap();
        let other = store.create_menu(page("Other", None)).await.unwrap();
        let r = store.create_role(role("coach")).await.unwrap();
        store
            .replace_assignments(r.id, &set(&[child.id, leaf.id, other.id]))
            .await
            .unwrap();

        let removed = store.delete_menu(child.id).await.unwrap();
        assert_eq!(removed, vec![child.id, leaf.id]);
        assert!(store.find_menu(leaf.id).await.unwrap().is_none());
        assert!(store.find_menu(root.id).await.unwrap().is_some());
        assert_eq!(store.assigned_menu_ids(r.id).await.unwrap(), set(&[other.id]));
    }

    #[tokio::test]
    async fn replace_is_all_or_nothing() {
        let store = MemoryStorage::new();
        let a = store.create_menu(page("A", None)).await.unwrap();
        let b = store.create_menu(page("B", None)).await.unwrap();
        let r = store.create_role(role("coach")).await.unwrap();
        store.replace_assignments(r.id, &set(&[a.id])).await.unwrap();

        match store.replace_assignments(r.id, &set(&[b.id, 77])).await {
            Err(MenuError::InvalidReference { ids }) => assert_eq!(ids, vec![77]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.assigned_menu_ids(r.id).await.unwrap(), set(&[a.id]));

        store.replace_assignments(r.id, &set(&[b.id])).await.unwrap();
        assert_eq!(store.assigned_menu_ids(r.id).await.unwrap(), set(&[b.id]));
    }

    #[tokio::test]
    async fn deleting_role_removes_assignments() {
        let store = MemoryStorage::new();
        let a = store.create_menu(page("A", None)).await.unwrap();
        let r = store.create_role(role("coach")).await.unwrap();
        let keep = store.create_role(role("member")).await.unwrap();
        store.replace_assignments(r.id, &set(&[a.id])).await.unwrap();
        store.replace_assignments(keep.id, &set(&[a.id])).await.unwrap();

        store.delete_role(r.id).await.unwrap();
        assert!(matches!(
            store.assigned_menu_ids(r.id).await,
            Err(MenuError::NotFound { entity: "role", .. })
        ));
        assert!(!store.tables.read().assignments.iter().any(|(role_id, _)| *role_id == r.id));
        assert_eq!(store.assigned_menu_ids(keep.id).await.unwrap(), set(&[a.id]));
    }

    #[tokio::test]
    async fn role_codes_are_unique() {
        let store = MemoryStorage::new();
        let coach = store.create_role(role("coach")).await.unwrap();
        assert!(matches!(
            store.create_role(role("coach")).await,
            Err(MenuError::Validation(_))
        ));
        let other = store.create_role(role("member")).await.unwrap();
        let patch = UpdateRole {
            code: Some("coach".into()),
            ..UpdateRole::default()
        };
        assert!(store.update_role(other.id, patch).await.is_err());
        let same = UpdateRole {
            code: Some("coach".into()),
            ..UpdateRole::default()
        };
        assert!(store.update_role(coach.id, same).await.is_ok());
    }

    #[tokio::test]
    async fn list_roles_filters_and_paginates() {
        let store = MemoryStorage::new();
        for code in ["coach_a", "coach_b", "coach_c", "member"] {
            store.create_role(role(code)).await.unwrap();
        }
        let toggled = store.toggle_role_enabled(2).await.unwrap();
        assert!(!toggled.enabled);

        let filter = RoleFilter {
            code: Some("coach".into()),
            page: Some(2),
            page_size: Some(2),
            ..RoleFilter::default()
        };
        let page = store.list_roles(&filter).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].code, "coach_c");

        let enabled_only = RoleFilter {
            enabled: Some(true),
            ..RoleFilter::default()
        };
        assert_eq!(store.list_roles(&enabled_only).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn list_enabled_skips_disabled() {
        let store = MemoryStorage::new();
        store.create_menu(page("On", None)).await.unwrap();
        let mut off = page("Off", None);
        off.enabled = Some(false);
        store.create_menu(off).await.unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 2);
        assert_eq!(store.list_enabled().await.unwrap().len(), 1);
    }
}
