//! Menu node model.
//!
//! Menu nodes form the navigation/permission hierarchy. Each node has a kind
//! (page, iframe, external link, button), an optional parent, and a sort rank
//! used to order siblings.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::menu::{MenuError, MenuResult};

/// Maximum length of a menu title.
pub const MAX_TITLE_LEN: usize = 64;

/// Maximum length of a menu path.
pub const MAX_PATH_LEN: usize = 255;

/// Maximum length of route names, component identifiers and permission keys.
pub const MAX_IDENT_LEN: usize = 128;

/// Kind of a menu node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MenuKind {
    /// Routed page rendered by a client-side view component.
    #[serde(rename = "page")]
    Page,
    /// Page that embeds an external URL.
    #[serde(rename = "iframe")]
    IFrame,
    /// Link that leaves the application.
    #[serde(rename = "external_link")]
    ExternalLink,
    /// Action gate inside a page. Always a leaf.
    #[serde(rename = "button")]
    Button,
}

impl MenuKind {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::IFrame => "iframe",
            Self::ExternalLink => "external_link",
            Self::Button => "button",
        }
    }
}

impl fmt::Display for MenuKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored kind text that does not name a [`MenuKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown menu kind '{0}'")]
pub struct UnknownMenuKind(pub String);

impl TryFrom<String> for MenuKind {
    type Error = UnknownMenuKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "page" => Ok(Self::Page),
            "iframe" => Ok(Self::IFrame),
            "external_link" => Ok(Self::ExternalLink),
            "button" => Ok(Self::Button),
            _ => Err(UnknownMenuKind(value)),
        }
    }
}

/// Menu node record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MenuNode {
    /// Server-assigned identifier.
    pub id: i64,

    /// Parent node, `None` for roots. `0` on the wire also means root.
    #[serde(default, deserialize_with = "parent_id")]
    pub parent_id: Option<i64>,

    #[sqlx(try_from = "String")]
    pub kind: MenuKind,

    /// Display title.
    pub title: String,

    /// Client-side route name.
    pub route_name: Option<String>,

    /// Route path, or the target URL for links and iframes.
    pub path: Option<String>,

    /// Logical view identifier (pages only).
    pub component: Option<String>,

    /// Opaque action key used by clients to gate buttons.
    pub permission_key: Option<String>,

    /// Sibling order (ascending, ties broken by id).
    pub sort_rank: i32,

    /// Disabled nodes are hidden from navigation but stay editable.
    pub enabled: bool,

    /// Unix timestamp when created.
    pub created: i64,

    /// Unix timestamp when last changed.
    pub changed: i64,
}

impl MenuNode {
    /// Check field-level rules for this node.
    pub fn validate(&self) -> MenuResult<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(MenuError::Validation("title must not be empty".into()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(MenuError::Validation(format!(
                "title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        if let Some(ref path) = self.path
            && path.chars().count() > MAX_PATH_LEN
        {
            return Err(MenuError::Validation(format!(
                "path must be at most {MAX_PATH_LEN} characters"
            )));
        }
        for (field, value) in [
            ("routeName", &self.route_name),
            ("component", &self.component),
            ("permissionKey", &self.permission_key),
        ] {
            if let Some(v) = value
                && v.chars().count() > MAX_IDENT_LEN
            {
                return Err(MenuError::Validation(format!(
                    "{field} must be at most {MAX_IDENT_LEN} characters"
                )));
            }
        }

        match self.kind {
            MenuKind::Page => {
                if is_blank(&self.component) {
                    return Err(MenuError::Validation(
                        "page menus require a component".into(),
                    ));
                }
            }
            MenuKind::IFrame | MenuKind::ExternalLink => {
                let url = self.path.as_deref().unwrap_or_default();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(MenuError::Validation(format!(
                        "{} menus require an http(s) path",
                        self.kind
                    )));
                }
            }
            MenuKind::Button => {
                if is_blank(&self.permission_key) {
                    return Err(MenuError::Validation(
                        "button menus require a permissionKey".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Input for creating a menu node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMenuNode {
    #[serde(default, deserialize_with = "parent_id")]
    pub parent_id: Option<i64>,
    pub kind: MenuKind,
    pub title: String,
    pub route_name: Option<String>,
    pub path: Option<String>,
    pub component: Option<String>,
    pub permission_key: Option<String>,
    pub sort_rank: Option<i32>,
    pub enabled: Option<bool>,
}

impl CreateMenuNode {
    /// Materialize the node a store would insert, before an id is assigned.
    pub fn into_node(self, id: i64, now: i64) -> MenuNode {
        MenuNode {
            id,
            parent_id: self.parent_id,
            kind: self.kind,
            title: self.title.trim().to_string(),
            route_name: self.route_name,
            path: self.path,
            component: self.component,
            permission_key: self.permission_key,
            sort_rank: self.sort_rank.unwrap_or(0),
            enabled: self.enabled.unwrap_or(true),
            created: now,
            changed: now,
        }
    }
}

/// Partial update for a menu node.
///
/// Nullable fields distinguish "absent" (keep) from `null` (clear).
/// `parent_id` also treats `0` as `null` (move to root).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMenuNode {
    #[serde(default, deserialize_with = "parent_patch")]
    pub parent_id: Option<Option<i64>>,
    pub kind: Option<MenuKind>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable_patch")]
    pub route_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_patch")]
    pub path: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_patch")]
    pub component: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_patch")]
    pub permission_key: Option<Option<String>>,
    pub sort_rank: Option<i32>,
    pub enabled: Option<bool>,
}

impl UpdateMenuNode {
    /// Patch that only moves a node.
    pub fn reparent(parent_id: Option<i64>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    /// Apply this patch to an existing node, returning the merged result.
    pub fn apply_to(self, existing: &MenuNode, now: i64) -> MenuNode {
        MenuNode {
            id: existing.id,
            parent_id: self.parent_id.unwrap_or(existing.parent_id),
            kind: self.kind.unwrap_or(existing.kind),
            title: self
                .title
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|| existing.title.clone()),
            route_name: self
                .route_name
                .unwrap_or_else(|| existing.route_name.clone()),
            path: self.path.unwrap_or_else(|| existing.path.clone()),
            component: self
                .component
                .unwrap_or_else(|| existing.component.clone()),
            permission_key: self
                .permission_key
                .unwrap_or_else(|| existing.permission_key.clone()),
            sort_rank: self.sort_rank.unwrap_or(existing.sort_rank),
            enabled: self.enabled.unwrap_or(existing.enabled),
            created: existing.created,
            changed: now,
        }
    }
}

/// Map a wire parent id onto `Option`, treating `0` and `null` as root.
fn parent_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.filter(|id| *id != 0))
}

/// Like [`parent_id`], but a present field always yields `Some`.
fn parent_patch<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    parent_id(deserializer).map(Some)
}

/// A present field yields `Some`, so an explicit `null` clears the value.
fn nullable_patch<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn page(title: &str) -> MenuNode {
        CreateMenuNode {
            parent_id: None,
            kind: MenuKind::Page,
            title: title.to_string(),
            route_name: Some("Dashboard".into()),
            path: Some("/dashboard".into()),
            component: Some("dashboard/index".into()),
            permission_key: None,
            sort_rank: None,
            enabled: None,
        }
        .into_node(1, 100)
    }

    #[test]
    fn zero_parent_means_root() {
        let input: CreateMenuNode = serde_json::from_value(serde_json::json!({
            "parentId": 0,
            "kind": "page",
            "title": "Home",
            "component": "home"
        }))
        .unwrap();
        assert_eq!(input.parent_id, None);

        let input: CreateMenuNode = serde_json::from_value(serde_json::json!({
            "parentId": 4,
            "kind": "button",
            "title": "Delete",
            "permissionKey": "food:delete"
        }))
        .unwrap();
        assert_eq!(input.parent_id, Some(4));
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let absent: UpdateMenuNode = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(absent.parent_id, None);

        let null: UpdateMenuNode =
            serde_json::from_value(serde_json::json!({ "parentId": null })).unwrap();
        assert_eq!(null.parent_id, Some(None));

        let zero: UpdateMenuNode =
            serde_json::from_value(serde_json::json!({ "parentId": 0 })).unwrap();
        assert_eq!(zero.parent_id, Some(None));

        let moved: UpdateMenuNode =
            serde_json::from_value(serde_json::json!({ "parentId": 12 })).unwrap();
        assert_eq!(moved.parent_id, Some(Some(12)));
    }

    #[test]
    fn defaults_applied_on_create() {
        let node = page("  Dashboard ");
        assert_eq!(node.title, "Dashboard");
        assert_eq!(node.sort_rank, 0);
        assert!(node.enabled);
        assert_eq!(node.created, node.changed);
    }

    #[test]
    fn apply_patch_keeps_untouched_fields() {
        let node = page("Dashboard");
        let patch = UpdateMenuNode {
            title: Some("Overview".into()),
            sort_rank: Some(5),
            ..UpdateMenuNode::default()
        };
        let merged = patch.apply_to(&node, 200);
        assert_eq!(merged.title, "Overview");
        assert_eq!(merged.sort_rank, 5);
        assert_eq!(merged.component, node.component);
        assert_eq!(merged.created, 100);
        assert_eq!(merged.changed, 200);
    }

    #[test]
    fn explicit_null_clears_optional_fields() {
        let mut node = page("Reports");
        node.permission_key = Some("report:view".into());

        let patch: UpdateMenuNode = serde_json::from_value(serde_json::json!({
            "permissionKey": null,
            "routeName": null
        }))
        .unwrap();
        assert_eq!(patch.permission_key, Some(None));
        assert_eq!(patch.component, None);

        let merged = patch.apply_to(&node, 200);
        assert_eq!(merged.permission_key, None);
        assert_eq!(merged.route_name, None);
        assert_eq!(merged.component, node.component);
        assert_eq!(merged.path, node.path);
    }

    #[test]
    fn kind_change_can_drop_component() {
        let node = page("Docs");
        let patch: UpdateMenuNode = serde_json::from_value(serde_json::json!({
            "kind": "external_link",
            "path": "https://docs.example.com",
            "component": null
        }))
        .unwrap();
        let merged = patch.apply_to(&node, 200);
        assert_eq!(merged.kind, MenuKind::ExternalLink);
        assert_eq!(merged.component, None);
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn validation_rules_by_kind() {
        assert!(page("Dashboard").validate().is_ok());

        let mut blank = page("   ");
        blank.title = "   ".into();
        assert!(matches!(blank.validate(), Err(MenuError::Validation(_))));

        let mut no_component = page("Foods");
        no_component.component = None;
        assert!(no_component.validate().is_err());

        let mut link = page("Docs");
        link.kind = MenuKind::ExternalLink;
        link.path = Some("docs.example.com".into());
        assert!(link.validate().is_err());
        link.path = Some("https://docs.example.com".into());
        assert!(link.validate().is_ok());

        let mut button = page("Delete");
        button.kind = MenuKind::Button;
        assert!(button.validate().is_err());
        button.permission_key = Some("food:delete".into());
        assert!(button.validate().is_ok());

        let long = page(&"x".repeat(MAX_TITLE_LEN + 1));
        assert!(long.validate().is_err());
    }

    #[test]
    fn kind_round_trips_through_storage_text() {
        for kind in [
            MenuKind::Page,
            MenuKind::IFrame,
            MenuKind::ExternalLink,
            MenuKind::Button,
        ] {
            assert_eq!(MenuKind::try_from(kind.as_str().to_string()), Ok(kind));
        }
        assert!(MenuKind::try_from("folder".to_string()).is_err());
    }
}
