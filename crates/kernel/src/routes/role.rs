//! Role and role-menu assignment routes.
//!
//! Role CRUD and assignment editing are super-admin only. The super-admin
//! role itself cannot be deleted, disabled, or recoded.

use std::collections::BTreeSet;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppResult;
use crate::menu::{EditorSummary, MenuError};
use crate::middleware::Caller;
use crate::models::{CreateRole, Page, Role, RoleFilter, UpdateRole};
use crate::permissions::Action;
use crate::state::AppState;
use crate::storage::{AssignmentStore, RoleStore};

use super::helpers::{ApiJson, ApiPath, ApiQuery};

/// A role's assigned menu ids.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuIds {
    pub menu_ids: BTreeSet<i64>,
}

/// Create the role router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route(
            "/roles/{id}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/roles/{id}/status", patch(toggle_status))
        .route(
            "/roles/{id}/menus",
            get(get_role_menus).put(replace_role_menus),
        )
        .route("/roles/{id}/menus/editor", get(role_menu_editor))
        .route("/roles/{id}/menus/all", post(assign_all_menus))
}

fn protected(role: &Role) -> MenuError {
    MenuError::Validation(format!(
        "role '{}' is the super-admin role and cannot be deleted, disabled, or recoded",
        role.code
    ))
}

async fn find_role(state: &AppState, id: i64) -> AppResult<Role> {
    Ok(state
        .storage()
        .find_role(id)
        .await?
        .ok_or_else(|| MenuError::role_not_found(id))?)
}

async fn list_roles(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(filter): ApiQuery<RoleFilter>,
) -> AppResult<Json<Page<Role>>> {
    state
        .permissions()
        .authorize(&caller, Action::ManageRoles)
        .await?;

    Ok(Json(state.storage().list_roles(&filter).await?))
}

async fn get_role(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Role>> {
    state
        .permissions()
        .authorize(&caller, Action::ManageRoles)
        .await?;

    Ok(Json(find_role(&state, id).await?))
}

async fn create_role(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<CreateRole>,
) -> AppResult<impl IntoResponse> {
    state
        .permissions()
        .authorize(&caller, Action::ManageRoles)
        .await?;

    let role = state.storage().create_role(input).await?;
    state.permissions().invalidate_all();
    Ok((StatusCode::CREATED, Json(role)))
}

async fn update_role(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<UpdateRole>,
) -> AppResult<Json<Role>> {
    state
        .permissions()
        .authorize(&caller, Action::ManageRoles)
        .await?;

    let existing = find_role(&state, id).await?;
    if state.permissions().is_protected_role(&existing) {
        let disables = patch.enabled == Some(false);
        let recodes = patch
            .code
            .as_deref()
            .is_some_and(|c| c.trim() != existing.code);
        if disables || recodes {
            return Err(protected(&existing).into());
        }
    }

    let role = state.storage().update_role(id, patch).await?;
    state.permissions().invalidate_all();
    Ok(Json(role))
}

async fn delete_role(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<StatusCode> {
    state
        .permissions()
        .authorize(&caller, Action::ManageRoles)
        .await?;

    let existing = find_role(&state, id).await?;
    if state.permissions().is_protected_role(&existing) {
        return Err(protected(&existing).into());
    }

    state.storage().delete_role(id).await?;
    state.permissions().invalidate_all();
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_status(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Role>> {
    state
        .permissions()
        .authorize(&caller, Action::ManageRoles)
        .await?;

    let existing = find_role(&state, id).await?;
    if state.permissions().is_protected_role(&existing) {
        return Err(protected(&existing).into());
    }

    let role = state.storage().toggle_role_enabled(id).await?;
    state.permissions().invalidate_all();
    Ok(Json(role))
}

async fn get_role_menus(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<MenuIds>> {
    state
        .permissions()
        .authorize(&caller, Action::AssignMenus)
        .await?;

    let menu_ids = state.storage().assigned_menu_ids(id).await?;
    Ok(Json(MenuIds { menu_ids }))
}

async fn replace_role_menus(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<MenuIds>,
) -> AppResult<Json<MenuIds>> {
    let grant = state
        .permissions()
        .authorize(&caller, Action::AssignMenus)
        .await?;

    let menu_ids = state.resolver().save_assignment(id, &body.menu_ids).await?;
    info!(role_id = id, count = menu_ids.len(), by = %grant.role.code, "role menus saved via API");
    Ok(Json(MenuIds { menu_ids }))
}

async fn role_menu_editor(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<EditorSummary>> {
    state
        .permissions()
        .authorize(&caller, Action::AssignMenus)
        .await?;

    Ok(Json(state.resolver().editor_summary(id).await?))
}

async fn assign_all_menus(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<MenuIds>> {
    state
        .permissions()
        .authorize(&caller, Action::AssignMenus)
        .await?;

    let menu_ids = state.resolver().select_all_and_save(id).await?;
    Ok(Json(MenuIds { menu_ids }))
}
