//! Role model, filters and pagination.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::menu::{MenuError, MenuResult};

/// Maximum length of a role display name.
pub const MAX_ROLE_NAME_LEN: usize = 64;

/// Default page size for role listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

#[allow(clippy::expect_used)]
static ROLE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]{1,63}$").expect("role code pattern compiles")
});

/// Role record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: i64,
    /// Machine-readable code the auth layer puts in tokens.
    pub code: String,
    pub name: String,
    pub enabled: bool,
    pub created: i64,
    pub changed: i64,
}

impl Role {
    /// Check field-level rules for this role.
    pub fn validate(&self) -> MenuResult<()> {
        validate_code(&self.code)?;
        let name = self.name.trim();
        if name.is_empty() {
            return Err(MenuError::Validation("name must not be empty".into()));
        }
        if name.chars().count() > MAX_ROLE_NAME_LEN {
            return Err(MenuError::Validation(format!(
                "name must be at most {MAX_ROLE_NAME_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Validate a role code.
pub fn validate_code(code: &str) -> MenuResult<()> {
    if ROLE_CODE_RE.is_match(code) {
        Ok(())
    } else {
        Err(MenuError::Validation(format!(
            "role code '{code}' must start with a letter and contain 2-64 letters, digits or underscores"
        )))
    }
}

/// Input for creating a role.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRole {
    pub code: String,
    pub name: String,
    pub enabled: Option<bool>,
}

impl CreateRole {
    /// Materialize the role a store would insert.
    pub fn into_role(self, id: i64, now: i64) -> Role {
        Role {
            id,
            code: self.code.trim().to_string(),
            name: self.name.trim().to_string(),
            enabled: self.enabled.unwrap_or(true),
            created: now,
            changed: now,
        }
    }
}

/// Partial update for a role.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRole {
    pub code: Option<String>,
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

impl UpdateRole {
    /// Apply this patch to an existing role.
    pub fn apply_to(self, existing: &Role, now: i64) -> Role {
        Role {
            id: existing.id,
            code: self
                .code
                .map(|c| c.trim().to_string())
                .unwrap_or_else(|| existing.code.clone()),
            name: self
                .name
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| existing.name.clone()),
            enabled: self.enabled.unwrap_or(existing.enabled),
            created: existing.created,
            changed: now,
        }
    }
}

/// Role listing filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleFilter {
    /// Case-insensitive substring of the display name.
    pub name: Option<String>,
    /// Case-insensitive substring of the code.
    pub code: Option<String>,
    pub enabled: Option<bool>,
    /// 1-based page number.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl RoleFilter {
    /// Effective 1-based page number.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Effective page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Row offset for the effective page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.page_size())
    }

    /// Non-empty name needle, lowercased.
    pub fn name_needle(&self) -> Option<String> {
        needle(self.name.as_deref())
    }

    /// Non-empty code needle, lowercased.
    pub fn code_needle(&self) -> Option<String> {
        needle(self.code.as_deref())
    }

    /// In-memory evaluation of the filter (pagination excluded).
    pub fn matches(&self, role: &Role) -> bool {
        if let Some(n) = self.name_needle()
            && !role.name.to_lowercase().contains(&n)
        {
            return false;
        }
        if let Some(c) = self.code_needle()
            && !role.code.to_lowercase().contains(&c)
        {
            return false;
        }
        self.enabled.is_none_or(|e| role.enabled == e)
    }
}

fn needle(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}
