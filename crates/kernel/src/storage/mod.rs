//! Persistence layer for menus, roles and role-menu assignments.
//!
//! All engine reads and writes go through these traits. Two implementations
//! exist: [`PgStorage`] for PostgreSQL and [`MemoryStorage`] for tests and
//! single-process deployments. Each multi-row write is atomic: either the
//! whole change lands or the prior state is untouched.

mod memory;
mod postgres;

use std::collections::BTreeSet;

use async_trait::async_trait;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

use crate::menu::MenuResult;
use crate::models::{CreateMenuNode, CreateRole, MenuNode, Page, Role, RoleFilter, UpdateMenuNode, UpdateRole};

/// Flat menu node table.
#[async_trait]
pub trait MenuStore: Send + Sync {
    /// Every node, disabled and button nodes included.
    async fn list_all(&self) -> MenuResult<Vec<MenuNode>>;

    /// Enabled nodes only.
    async fn list_enabled(&self) -> MenuResult<Vec<MenuNode>>;

    async fn find_menu(&self, id: i64) -> MenuResult<Option<MenuNode>>;

    /// Insert a node. The parent must exist and accept children.
    async fn create_menu(&self, input: CreateMenuNode) -> MenuResult<MenuNode>;

    /// Patch a node. Fails with `NotFound` if absent and `InvalidHierarchy`
    /// if the new parent is the node itself or one of its descendants.
    async fn update_menu(&self, id: i64, patch: UpdateMenuNode) -> MenuResult<MenuNode>;

    /// Delete a node, its descendants, and every assignment referencing them.
    ///
    /// Returns the removed ids, ascending.
    async fn delete_menu(&self, id: i64) -> MenuResult<Vec<i64>>;
}

/// Role table.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn list_roles(&self, filter: &RoleFilter) -> MenuResult<Page<Role>>;

    async fn find_role(&self, id: i64) -> MenuResult<Option<Role>>;

    async fn find_role_by_code(&self, code: &str) -> MenuResult<Option<Role>>;

    /// Insert a role. Codes are unique.
    async fn create_role(&self, input: CreateRole) -> MenuResult<Role>;

    async fn update_role(&self, id: i64, patch: UpdateRole) -> MenuResult<Role>;

    /// Delete a role and its assignments.
    async fn delete_role(&self, id: i64) -> MenuResult<()>;

    /// Flip the enabled flag, returning the updated role.
    async fn toggle_role_enabled(&self, id: i64) -> MenuResult<Role>;
}

/// Role-menu assignment table.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Menu ids assigned to a role, exactly as stored.
    ///
    /// Fails with `NotFound` if the role does not exist.
    async fn assigned_menu_ids(&self, role_id: i64) -> MenuResult<BTreeSet<i64>>;

    /// Replace a role's assignment wholesale.
    ///
    /// Fails with `InvalidReference` (changing nothing) if any id is not a
    /// live menu node. Concurrent saves for one role are last-write-wins.
    async fn replace_assignments(&self, role_id: i64, menu_ids: &BTreeSet<i64>) -> MenuResult<()>;
}

/// Complete storage backend for the permission engine.
#[async_trait]
pub trait PermissionStorage: MenuStore + RoleStore + AssignmentStore {
    /// Whether the backend can currently serve requests.
    async fn ping(&self) -> bool;

    /// Backend name for health output.
    fn backend(&self) -> &'static str;
}

/// Current Unix timestamp.
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
