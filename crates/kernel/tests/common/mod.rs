#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! [`TestApp`] drives the REAL kernel router and state over an in-memory
//! store, so every test gets an isolated backend with no external services.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use vitalis_kernel::state::AppState;
use vitalis_kernel::storage::{MemoryStorage, PermissionStorage};
use vitalis_test_utils::{TEST_JWT_SECRET, TestMenu, TestRole, bearer_token, test_role};

pub const SUPER_ADMIN: &str = "super_admin";

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin_token: String,
}

impl TestApp {
    /// Fresh app over an empty in-memory store, super-admin role seeded.
    pub async fn new() -> Self {
        let storage: Arc<dyn PermissionStorage> = Arc::new(MemoryStorage::new());
        Self::with_storage(storage).await
    }

    /// App over the given storage backend.
    pub async fn with_storage(storage: Arc<dyn PermissionStorage>) -> Self {
        let state = AppState::with_storage(storage, SUPER_ADMIN, TEST_JWT_SECRET.as_bytes());
        state
            .permissions()
            .ensure_super_admin()
            .await
            .expect("Failed to seed super-admin role");

        Self {
            router: vitalis_kernel::app(state.clone()),
            state,
            admin_token: bearer_token(TEST_JWT_SECRET, "admin", SUPER_ADMIN),
        }
    }

    /// Send a request through the router.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request")
    }

    /// Send a JSON request, optionally authenticated, and decode the reply.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.request(request).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    /// Shorthand for an admin request.
    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let token = self.admin_token.clone();
        self.send(method, uri, Some(&token), body).await
    }

    /// Create a menu node as admin, returning its id.
    pub async fn create_menu(&self, menu: TestMenu) -> i64 {
        let (status, body) = self.admin(Method::POST, "/menus", Some(menu.to_json())).await;
        assert_eq!(status, StatusCode::CREATED, "create menu failed: {body}");
        body["id"].as_i64().unwrap()
    }

    /// Create a role as admin, returning its id.
    pub async fn create_role(&self, role: TestRole) -> i64 {
        let (status, body) = self.admin(Method::POST, "/roles", Some(role.to_json())).await;
        assert_eq!(status, StatusCode::CREATED, "create role failed: {body}");
        body["id"].as_i64().unwrap()
    }

    /// Create an enabled role and a token for it.
    pub async fn role_with_token(&self, code: &str) -> (i64, String) {
        let id = self.create_role(test_role(code, code)).await;
        (id, bearer_token(TEST_JWT_SECRET, code, code))
    }

    /// Replace a role's assignment as admin.
    pub async fn assign(&self, role_id: i64, menu_ids: &[i64]) -> (StatusCode, Value) {
        self.admin(
            Method::PUT,
            &format!("/roles/{role_id}/menus"),
            Some(serde_json::json!({ "menuIds": menu_ids })),
        )
        .await
    }
}

/// Decode a response body as JSON, `Null` when empty.
pub async fn response_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Response is not JSON")
    }
}
