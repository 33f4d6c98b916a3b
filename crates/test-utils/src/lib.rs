//! Vitalis test utilities.
//!
//! Helpers for integration testing: request-body builders for menu nodes
//! and roles, bearer token minting, and JSON assertions.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

/// Secret shared by test apps and the tokens minted for them.
pub const TEST_JWT_SECRET: &str = "vitalis-test-secret-0123456789";

/// Create a page node builder.
pub fn test_page(title: &str) -> TestMenu {
    TestMenu {
        kind: "page",
        title: title.to_string(),
        parent_id: None,
        route_name: Some(title.replace(' ', "")),
        path: Some(format!("/{}", title.to_lowercase().replace(' ', "-"))),
        component: Some(format!("views/{}", title.to_lowercase().replace(' ', "_"))),
        permission_key: None,
        sort_rank: None,
        enabled: None,
    }
}

/// Create a button node builder under `parent_id`.
pub fn test_button(title: &str, parent_id: i64, permission_key: &str) -> TestMenu {
    TestMenu {
        kind: "button",
        route_name: None,
        path: None,
        component: None,
        permission_key: Some(permission_key.to_string()),
        ..test_page(title)
    }
    .with_parent(parent_id)
}

/// Create an external link node builder.
pub fn test_link(title: &str, url: &str) -> TestMenu {
    TestMenu {
        kind: "external_link",
        path: Some(url.to_string()),
        component: None,
        ..test_page(title)
    }
}

/// A menu node request body builder.
#[derive(Debug, Clone)]
pub struct TestMenu {
    pub kind: &'static str,
    pub title: String,
    pub parent_id: Option<i64>,
    pub route_name: Option<String>,
    pub path: Option<String>,
    pub component: Option<String>,
    pub permission_key: Option<String>,
    pub sort_rank: Option<i32>,
    pub enabled: Option<bool>,
}

impl TestMenu {
    /// Set the parent.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the sort rank.
    pub fn with_rank(mut self, rank: i32) -> Self {
        self.sort_rank = Some(rank);
        self
    }

    /// Mark as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }

    /// Drop the component.
    pub fn without_component(mut self) -> Self {
        self.component = None;
        self
    }

    /// Render as a `POST /menus` body.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "kind": self.kind,
            "title": self.title,
            "parentId": self.parent_id,
            "routeName": self.route_name,
            "path": self.path,
            "component": self.component,
            "permissionKey": self.permission_key,
            "sortRank": self.sort_rank,
            "enabled": self.enabled,
        })
    }
}

/// Create a role builder.
pub fn test_role(code: &str, name: &str) -> TestRole {
    TestRole {
        code: code.to_string(),
        name: name.to_string(),
        enabled: None,
    }
}

/// A role request body builder.
#[derive(Debug, Clone)]
pub struct TestRole {
    pub code: String,
    pub name: String,
    pub enabled: Option<bool>,
}

impl TestRole {
    /// Mark as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }

    /// Render as a `POST /roles` body.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "code": self.code,
            "name": self.name,
            "enabled": self.enabled,
        })
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    role: &'a str,
    exp: u64,
}

/// Mint an HS256 bearer token for `role_code`, valid for one hour.
///
/// # Panics
///
/// Panics if encoding fails, which only happens with a broken key.
#[allow(clippy::expect_used)]
pub fn bearer_token(secret: &str, subject: &str, role_code: &str) -> String {
    let exp = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default() + 3600;
    let claims = Claims {
        sub: subject,
        role: role_code,
        exp,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode test token")
}

/// Assertion helpers for JSON responses.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON object contains a key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "expected key '{key}' in JSON: {value}"
        );
    }

    /// Assert that a failure body carries the given error kind.
    pub fn error_kind(value: &Value, kind: &str) {
        assert_eq!(
            value.get("kind").and_then(Value::as_str),
            Some(kind),
            "unexpected error body: {value}"
        );
        has_key(value, "message");
    }

    /// Collect an array of integers, e.g. `menuIds`.
    pub fn ids(value: &Value) -> Vec<i64> {
        value
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default()
    }

    /// Depth-first ids of a serialized menu tree.
    pub fn tree_ids(value: &Value) -> Vec<i64> {
        let mut out = Vec::new();
        collect_tree_ids(value, &mut out);
        out
    }

    fn collect_tree_ids(value: &Value, out: &mut Vec<i64>) {
        for node in value.as_array().into_iter().flatten() {
            if let Some(id) = node.get("id").and_then(Value::as_i64) {
                out.push(id);
            }
            if let Some(children) = node.get("children") {
                collect_tree_ids(children, out);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn button_builder_targets_parent() {
        let body = test_button("Delete", 3, "user:delete").to_json();
        assert_eq!(body["kind"], "button");
        assert_eq!(body["parentId"], 3);
        assert_eq!(body["permissionKey"], "user:delete");
        assert!(body["component"].is_null());
    }

    #[test]
    fn page_builder_fills_component_and_path() {
        let body = test_page("User Admin").with_rank(2).to_json();
        assert_eq!(body["path"], "/user-admin");
        assert_eq!(body["component"], "views/user_admin");
        assert_eq!(body["sortRank"], 2);
    }

    #[test]
    fn tree_ids_walk_depth_first() {
        let tree = json!([
            {"id": 1, "children": [{"id": 2, "children": []}, {"id": 3, "children": []}]},
            {"id": 4, "children": []}
        ]);
        assert_eq!(assert::tree_ids(&tree), vec![1, 2, 3, 4]);
    }

    #[test]
    fn tokens_are_three_part_jwts() {
        let token = bearer_token(TEST_JWT_SECRET, "u-1", "coach");
        assert_eq!(token.split('.').count(), 3);
    }
}
