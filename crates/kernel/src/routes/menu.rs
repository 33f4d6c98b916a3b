//! Menu node routes.
//!
//! `GET /menus` serves navigation to every signed-in role; the super-admin
//! receives the full tree instead. Node CRUD is super-admin only.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tracing::info;

use crate::error::AppResult;
use crate::menu::{MenuError, MenuTree};
use crate::middleware::Caller;
use crate::models::{CreateMenuNode, MenuNode, UpdateMenuNode};
use crate::permissions::Action;
use crate::state::AppState;
use crate::storage::MenuStore;

use super::helpers::{ApiJson, ApiPath};

/// Create the menu router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/menus", get(list_menus).post(create_menu))
        .route(
            "/menus/{id}",
            get(get_menu).put(update_menu).delete(delete_menu),
        )
}

/// Navigation tree for the caller's role, or the full tree for the super-admin.
async fn list_menus(
    State(state): State<AppState>,
    caller: Caller,
) -> AppResult<Json<Vec<MenuTree>>> {
    let grant = state
        .permissions()
        .authorize(&caller, Action::ViewNavigation)
        .await?;

    let tree = if grant.super_admin {
        state.resolver().resolve_full().await?
    } else {
        state.resolver().resolve_for_role(grant.role.id).await?
    };
    Ok(Json(tree))
}

async fn get_menu(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<MenuNode>> {
    state
        .permissions()
        .authorize(&caller, Action::ManageMenus)
        .await?;

    let node = state
        .storage()
        .find_menu(id)
        .await?
        .ok_or_else(|| MenuError::menu_not_found(id))?;
    Ok(Json(node))
}

async fn create_menu(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<CreateMenuNode>,
) -> AppResult<impl IntoResponse> {
    state
        .permissions()
        .authorize(&caller, Action::ManageMenus)
        .await?;

    let node = state.storage().create_menu(input).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn update_menu(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<UpdateMenuNode>,
) -> AppResult<Json<MenuNode>> {
    state
        .permissions()
        .authorize(&caller, Action::ManageMenus)
        .await?;

    let node = state.storage().update_menu(id, patch).await?;
    Ok(Json(node))
}

async fn delete_menu(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<StatusCode> {
    let grant = state
        .permissions()
        .authorize(&caller, Action::ManageMenus)
        .await?;

    let removed = state.storage().delete_menu(id).await?;
    info!(menu_id = id, removed = ?removed, by = %grant.role.code, "menu deleted via API");
    Ok(StatusCode::NO_CONTENT)
}
