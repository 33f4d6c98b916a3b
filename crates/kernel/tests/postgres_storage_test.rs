#![allow(clippy::unwrap_used, clippy::expect_used)]
//! PostgreSQL storage tests.
//!
//! Ignored by default. Run with a disposable database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::TestApp;
use vitalis_kernel::db;
use vitalis_kernel::menu::MenuError;
use vitalis_kernel::models::UpdateMenuNode;
use vitalis_kernel::storage::{AssignmentStore, MenuStore, PgStorage, RoleStore};
use vitalis_test_utils::{assert, test_button, test_page, test_role};

async fn storage() -> Arc<PgStorage> {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to PostgreSQL");
    db::run_migrations(&pool).await.expect("Failed to migrate");
    sqlx::query("TRUNCATE sys_role_menu, sys_menu, sys_role RESTART IDENTITY")
        .execute(&pool)
        .await
        .expect("Failed to reset tables");
    Arc::new(PgStorage::new(pool))
}

// One test so the shared tables are never reset mid-run.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn postgres_backend_end_to_end() {
    let store = storage().await;
    let app = TestApp::with_storage(store.clone()).await;

    let root = app.create_menu(test_page("Root")).await;
    let a = app.create_menu(test_page("A").with_parent(root)).await;
    let b = app.create_menu(test_page("B").with_parent(root)).await;
    let role = app.create_role(test_role("coach", "Coach")).await;

    // Editor scenario.
    app.assign(role, &[a]).await;
    let (_, body) = app
        .admin(Method::GET, &format!("/roles/{role}/menus/editor"), None)
        .await;
    assert_eq!(assert::ids(&body["assignedIds"]), vec![a]);
    assert_eq!(assert::ids(&body["indeterminateIds"]), vec![root]);

    // Dead ids leave the assignment untouched.
    let (status, _) = app.assign(role, &[b, 9_999]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        store.assigned_menu_ids(role).await.unwrap(),
        BTreeSet::from([a])
    );

    // Cycle scenario.
    store
        .update_menu(a, UpdateMenuNode::reparent(Some(b)))
        .await
        .unwrap();
    let err = store
        .update_menu(b, UpdateMenuNode::reparent(Some(a)))
        .await
        .unwrap_err();
    assert!(matches!(err, MenuError::InvalidHierarchy(_)));

    // Select all, then cascade delete.
    let (_, body) = app
        .admin(Method::POST, &format!("/roles/{role}/menus/all"), None)
        .await;
    assert_eq!(assert::ids(&body["menuIds"]), vec![root, a, b]);

    let button = app.create_menu(test_button("Export", a, "x:export")).await;
    let removed = store.delete_menu(b).await.unwrap();
    assert_eq!(removed, vec![a, b, button]);
    assert_eq!(
        store.assigned_menu_ids(role).await.unwrap(),
        BTreeSet::from([root])
    );

    // Role codes stay unique, even through the API.
    let (status, _) = app
        .admin(
            Method::POST,
            "/roles",
            Some(json!({ "code": "coach", "name": "Again" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Role delete cascade.
    store.delete_role(role).await.unwrap();
    assert!(matches!(
        store.assigned_menu_ids(role).await,
        Err(MenuError::NotFound { entity: "role", .. })
    ));
    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sys_role_menu WHERE role_id = $1")
        .bind(role)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(orphans, 0);
}
