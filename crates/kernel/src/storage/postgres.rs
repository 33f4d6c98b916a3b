//! PostgreSQL storage backend.
//!
//! Multi-row writes run in one transaction. Cascades are explicit: the
//! subtree is collected with [`descendant_closure`] over the adjacency read
//! inside the transaction, then assignments and nodes are deleted in that
//! order. Hierarchy changes also take a transaction-scoped advisory lock so
//! two concurrent moves cannot each pass the cycle check and close a loop.

use std::collections::BTreeSet;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use super::{AssignmentStore, MenuStore, PermissionStorage, RoleStore, now};
use crate::db;
use crate::menu::hierarchy::{ParentMap, check_parent, check_parent_kind, descendant_closure};
use crate::menu::{MenuError, MenuResult};
use crate::models::{
    CreateMenuNode, CreateRole, MenuKind, MenuNode, Page, Role, RoleFilter, UpdateMenuNode,
    UpdateRole,
};

const MENU_COLUMNS: &str = "id, parent_id, kind, title, route_name, path, component, \
                            permission_key, sort_rank, enabled, created, changed";

const ROLE_COLUMNS: &str = "id, code, name, enabled, created, changed";

/// Advisory lock key serializing menu hierarchy changes.
const MENU_TREE_LOCK: i64 = 0x6d65_6e75_7472_6565;

/// PostgreSQL implementation of [`PermissionStorage`].
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Create a new PgStorage with a database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn lock_menu_tree(tx: &mut Transaction<'_, Postgres>) -> MenuResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MENU_TREE_LOCK)
        .execute(&mut **tx)
        .await
        .context("failed to lock menu tree")?;
    Ok(())
}

async fn load_parent_map(tx: &mut Transaction<'_, Postgres>) -> MenuResult<ParentMap> {
    let rows: Vec<(i64, Option<i64>)> = sqlx::query_as("SELECT id, parent_id FROM sys_menu")
        .fetch_all(&mut **tx)
        .await
        .context("failed to load menu hierarchy")?;
    Ok(rows.into_iter().collect())
}

async fn find_menu_in(tx: &mut Transaction<'_, Postgres>, id: i64) -> MenuResult<Option<MenuNode>> {
    let node = sqlx::query_as::<_, MenuNode>(&format!(
        "SELECT {MENU_COLUMNS} FROM sys_menu WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .context("failed to fetch menu by id")?;
    Ok(node)
}

async fn code_taken(
    tx: &mut Transaction<'_, Postgres>,
    code: &str,
    except: Option<i64>,
) -> MenuResult<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sys_role WHERE code = $1 AND ($2::bigint IS NULL OR id <> $2))",
    )
    .bind(code)
    .bind(except)
    .fetch_one(&mut **tx)
    .await
    .context("failed to check role code")?;
    Ok(taken)
}

fn duplicate_code(code: &str) -> MenuError {
    MenuError::Validation(format!("role code '{code}' already exists"))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Escape `LIKE` wildcards in a user-supplied needle.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl MenuStore for PgStorage {
    async fn list_all(&self) -> MenuResult<Vec<MenuNode>> {
        let nodes = sqlx::query_as::<_, MenuNode>(&format!(
            "SELECT {MENU_COLUMNS} FROM sys_menu ORDER BY sort_rank, id"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list menus")?;
        Ok(nodes)
    }

    async fn list_enabled(&self) -> MenuResult<Vec<MenuNode>> {
        let nodes = sqlx::query_as::<_, MenuNode>(&format!(
            "SELECT {MENU_COLUMNS} FROM sys_menu WHERE enabled ORDER BY sort_rank, id"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list enabled menus")?;
        Ok(nodes)
    }

    async fn find_menu(&self, id: i64) -> MenuResult<Option<MenuNode>> {
        let node = sqlx::query_as::<_, MenuNode>(&format!(
            "SELECT {MENU_COLUMNS} FROM sys_menu WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch menu by id")?;
        Ok(node)
    }

    async fn create_menu(&self, input: CreateMenuNode) -> MenuResult<MenuNode> {
        let draft = input.into_node(0, now());
        draft.validate()?;

        let mut tx = self.pool.begin().await.context("failed to start transaction")?;

        if let Some(parent_id) = draft.parent_id {
            lock_menu_tree(&mut tx).await?;
            let parent = find_menu_in(&mut tx, parent_id)
                .await?
                .ok_or(MenuError::InvalidReference {
                    ids: vec![parent_id],
                })?;
            check_parent_kind(&parent)?;
        }

        let node = sqlx::query_as::<_, MenuNode>(&format!(
            r#"
            INSERT INTO sys_menu (parent_id, kind, title, route_name, path, component,
                                  permission_key, sort_rank, enabled, created, changed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MENU_COLUMNS}
            "#
        ))
        .bind(draft.parent_id)
        .bind(draft.kind.as_str())
        .bind(&draft.title)
        .bind(&draft.route_name)
        .bind(&draft.path)
        .bind(&draft.component)
        .bind(&draft.permission_key)
        .bind(draft.sort_rank)
        .bind(draft.enabled)
        .bind(draft.created)
        .bind(draft.changed)
        .fetch_one(&mut *tx)
        .await
        .context("failed to create menu")?;

        tx.commit().await.context("failed to commit transaction")?;

        info!(menu_id = node.id, kind = %node.kind, "menu created");
        Ok(node)
    }

    async fn update_menu(&self, id: i64, patch: UpdateMenuNode) -> MenuResult<MenuNode> {
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;
        lock_menu_tree(&mut tx).await?;

        let existing = find_menu_in(&mut tx, id)
            .await?
            .ok_or_else(|| MenuError::menu_not_found(id))?;
        let updated = patch.apply_to(&existing, now());
        updated.validate()?;

        if updated.parent_id != existing.parent_id {
            let parents = load_parent_map(&mut tx).await?;
            check_parent(&parents, id, updated.parent_id)?;
        }
        if let Some(parent_id) = updated.parent_id
            && let Some(parent) = find_menu_in(&mut tx, parent_id).await?
        {
            check_parent_kind(&parent)?;
        }
        if updated.kind == MenuKind::Button {
            let has_children: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sys_menu WHERE parent_id = $1)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await
                    .context("failed to check for child menus")?;
            if has_children {
                return Err(MenuError::InvalidHierarchy(format!(
                    "menu {id} has children and cannot become a button"
                )));
            }
        }

        let node = sqlx::query_as::<_, MenuNode>(&format!(
            r#"
            UPDATE sys_menu
            SET parent_id = $1, kind = $2, title = $3, route_name = $4, path = $5,
                component = $6, permission_key = $7, sort_rank = $8, enabled = $9, changed = $10
            WHERE id = $11
            RETURNING {MENU_COLUMNS}
            "#
        ))
        .bind(updated.parent_id)
        .bind(updated.kind.as_str())
        .bind(&updated.title)
        .bind(&updated.route_name)
        .bind(&updated.path)
        .bind(&updated.component)
        .bind(&updated.permission_key)
        .bind(updated.sort_rank)
        .bind(updated.enabled)
        .bind(updated.changed)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("failed to update menu")?;

        tx.commit().await.context("failed to commit transaction")?;

        info!(menu_id = id, parent_id = ?node.parent_id, "menu updated");
        Ok(node)
    }

    async fn delete_menu(&self, id: i64) -> MenuResult<Vec<i64>> {
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;
        lock_menu_tree(&mut tx).await?;

        let parents = load_parent_map(&mut tx).await?;
        if !parents.contains_key(&id) {
            return Err(MenuError::menu_not_found(id));
        }
        let removed = descendant_closure(&parents, id);

        let unassigned = sqlx::query("DELETE FROM sys_role_menu WHERE menu_id = ANY($1)")
            .bind(&removed)
            .execute(&mut *tx)
            .await
            .context("failed to delete menu assignments")?
            .rows_affected();

        sqlx::query("DELETE FROM sys_menu WHERE id = ANY($1)")
            .bind(&removed)
            .execute(&mut *tx)
            .await
            .context("failed to delete menus")?;

        tx.commit().await.context("failed to commit transaction")?;

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
impl RoleStore for PgStorage {
    async fn list_roles(&self, filter: &RoleFilter) -> MenuResult<Page<Role>> {
        const WHERE: &str = r#"
            WHERE ($1::text IS NULL OR LOWER(name) LIKE $1)
              AND ($2::text IS NULL OR LOWER(code) LIKE $2)
              AND ($3::bool IS NULL OR enabled = $3)
        "#;
        let name = filter.name_needle().map(|n| like_pattern(&n));
        let code = filter.code_needle().map(|c| like_pattern(&c));

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM sys_role {WHERE}"))
            .bind(&name)
            .bind(&code)
            .bind(filter.enabled)
            .fetch_one(&self.pool)
            .await
            .context("failed to count roles")?;

        let items = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM sys_role {WHERE} ORDER BY id LIMIT $4 OFFSET $5"
        ))
        .bind(&name)
        .bind(&code)
        .bind(filter.enabled)
        .bind(i64::from(filter.page_size()))
        .bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("failed to list roles")?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            page: filter.page(),
            page_size: filter.page_size(),
        })
    }

    async fn find_role(&self, id: i64) -> MenuResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM sys_role WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch role by id")?;
        Ok(role)
    }

    async fn find_role_by_code(&self, code: &str) -> MenuResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM sys_role WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch role by code")?;
        Ok(role)
    }

    async fn create_role(&self, input: CreateRole) -> MenuResult<Role> {
        let draft = input.into_role(0, now());
        draft.validate()?;

        let mut tx = self.pool.begin().await.context("failed to start transaction")?;
        if code_taken(&mut tx, &draft.code, None).await? {
            return Err(duplicate_code(&draft.code));
        }

        let role = sqlx::query_as::<_, Role>(&format!(
            "INSERT INTO sys_role (code, name, enabled, created, changed) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ROLE_COLUMNS}"
        ))
        .bind(&draft.code)
        .bind(&draft.name)
        .bind(draft.enabled)
        .bind(draft.created)
        .bind(draft.changed)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_code(&draft.code)
            } else {
                MenuError::Storage(anyhow::Error::new(e).context("failed to create role"))
            }
        })?;

        tx.commit().await.context("failed to commit transaction")?;

        info!(role_id = role.id, code = %role.code, "role created");
        Ok(role)
    }

    async fn update_role(&self, id: i64, patch: UpdateRole) -> MenuResult<Role> {
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;

        let existing = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM sys_role WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to fetch role by id")?
        .ok_or_else(|| MenuError::role_not_found(id))?;

        let updated = patch.apply_to(&existing, now());
        updated.validate()?;
        if updated.code != existing.code && code_taken(&mut tx, &updated.code, Some(id)).await? {
            return Err(duplicate_code(&updated.code));
        }

        let role = sqlx::query_as::<_, Role>(&format!(
            "UPDATE sys_role SET code = $1, name = $2, enabled = $3, changed = $4 \
             WHERE id = $5 RETURNING {ROLE_COLUMNS}"
        ))
        .bind(&updated.code)
        .bind(&updated.name)
        .bind(updated.enabled)
        .bind(updated.changed)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_code(&updated.code)
            } else {
                MenuError::Storage(anyhow::Error::new(e).context("failed to update role"))
            }
        })?;

        tx.commit().await.context("failed to commit transaction")?;

        info!(role_id = id, "role updated");
        Ok(role)
    }

    async fn delete_role(&self, id: i64) -> MenuResult<()> {
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;

        let unassigned = sqlx::query("DELETE FROM sys_role_menu WHERE role_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("failed to delete role assignments")?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM sys_role WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("failed to delete role")?
            .rows_affected();

        if deleted == 0 {
            // Dropping the transaction rolls back.
            return Err(MenuError::role_not_found(id));
        }

        tx.commit().await.context("failed to commit transaction")?;

        info!(role_id = id, assignments = unassigned, "role deleted");
        Ok(())
    }

    async fn toggle_role_enabled(&self, id: i64) -> MenuResult<Role> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "UPDATE sys_role SET enabled = NOT enabled, changed = $1 WHERE id = $2 \
             RETURNING {ROLE_COLUMNS}"
        ))
        .bind(now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to toggle role status")?
        .ok_or_else(|| MenuError::role_not_found(id))?;

        info!(role_id = id, enabled = role.enabled, "role status toggled");
        Ok(role)
    }
}

#[async_trait]
impl AssignmentStore for PgStorage {
    async fn assigned_menu_ids(&self, role_id: i64) -> MenuResult<BTreeSet<i64>> {
        if self.find_role(role_id).await?.is_none() {
            return Err(MenuError::role_not_found(role_id));
        }

        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT menu_id FROM sys_role_menu WHERE role_id = $1")
                .bind(role_id)
                .fetch_all(&self.pool)
                .await
                .context("failed to get role menus")?;
        Ok(ids.into_iter().collect())
    }

    async fn replace_assignments(&self, role_id: i64, menu_ids: &BTreeSet<i64>) -> MenuResult<()> {
        let wanted: Vec<i64> = menu_ids.iter().copied().collect();
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;

        let role_exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM sys_role WHERE id = $1 FOR UPDATE")
                .bind(role_id)
                .fetch_optional(&mut *tx)
                .await
                .context("failed to lock role")?;
        if role_exists.is_none() {
            return Err(MenuError::role_not_found(role_id));
        }

        // FOR SHARE keeps the validated menus alive until commit.
        let live: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM sys_menu WHERE id = ANY($1) FOR SHARE")
                .bind(&wanted)
                .fetch_all(&mut *tx)
                .await
                .context("failed to validate menu ids")?;
        let live: BTreeSet<i64> = live.into_iter().collect();
        let missing: Vec<i64> = menu_ids.difference(&live).copied().collect();
        if !missing.is_empty() {
            debug!(role_id, ?missing, "assignment rejected");
            return Err(MenuError::InvalidReference { ids: missing });
        }

        sqlx::query("DELETE FROM sys_role_menu WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await
            .context("failed to clear role menus")?;

        sqlx::query(
            "INSERT INTO sys_role_menu (role_id, menu_id) SELECT $1, UNNEST($2::bigint[])",
        )
        .bind(role_id)
        .bind(&wanted)
        .execute(&mut *tx)
        .await
        .context("failed to insert role menus")?;

        tx.commit().await.context("failed to commit transaction")?;

        info!(role_id, count = wanted.len(), "role menus replaced");
        Ok(())
    }
}

#[async_trait]
impl PermissionStorage for PgStorage {
    async fn ping(&self) -> bool {
        db::check_health(&self.pool).await
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("coach"), "%coach%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
