//! Permission checking service with DashMap-based caching.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::menu::MenuResult;
use crate::middleware::Caller;
use crate::models::{CreateRole, Role};
use crate::storage::{PermissionStorage, RoleStore};

/// Something a caller may ask to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewNavigation,
    ManageMenus,
    ManageRoles,
    AssignMenus,
}

/// An authorized caller's role.
#[derive(Debug, Clone)]
pub struct Grant {
    pub role: Role,
    pub super_admin: bool,
}

/// Permission service with fast DashMap-based lookups.
#[derive(Clone)]
pub struct PermissionService {
    inner: Arc<PermissionServiceInner>,
}

struct PermissionServiceInner {
    /// Cache of role code -> role. `None` caches a miss.
    role_cache: DashMap<String, Option<Role>>,

    /// Code of the role granted every action.
    super_admin_code: String,

    storage: Arc<dyn PermissionStorage>,
}

impl PermissionService {
    /// Create a new permission service.
    pub fn new(storage: Arc<dyn PermissionStorage>, super_admin_code: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(PermissionServiceInner {
                role_cache: DashMap::new(),
                super_admin_code: super_admin_code.into(),
                storage,
            }),
        }
    }

    /// Whether `role` is the super-admin role, which cannot be deleted,
    /// disabled, or recoded.
    pub fn is_protected_role(&self, role: &Role) -> bool {
        role.code == self.inner.super_admin_code
    }

    /// Authorize `caller` for `action`.
    ///
    /// - Anonymous callers are rejected with 401.
    /// - The super-admin role may do everything.
    /// - Any other enabled role may only view its navigation.
    /// - Unknown and disabled roles are rejected with 403.
    pub async fn authorize(&self, caller: &Caller, action: Action) -> AppResult<Grant> {
        let Some(code) = caller.role_code.as_deref() else {
            return Err(AppError::Unauthorized);
        };

        let Some(role) = self.role_by_code(code).await? else {
            debug!(code, "unknown role in token");
            return Err(AppError::Forbidden);
        };
        if !role.enabled {
            debug!(code, "disabled role denied");
            return Err(AppError::Forbidden);
        }

        let super_admin = self.is_protected_role(&role);
        if super_admin || action == Action::ViewNavigation {
            Ok(Grant { role, super_admin })
        } else {
            debug!(code, ?action, "action denied");
            Err(AppError::Forbidden)
        }
    }

    /// Look up a role by code, through the cache.
    async fn role_by_code(&self, code: &str) -> MenuResult<Option<Role>> {
        if let Some(cached) = self.inner.role_cache.get(code) {
            return Ok(cached.clone());
        }

        // Cache miss - load from storage
        let role = self.inner.storage.find_role_by_code(code).await?;
        self.inner.role_cache.insert(code.to_string(), role.clone());
        Ok(role)
    }

    /// Invalidate the entire cache.
    ///
    /// Call this when any role is created, changed, or deleted.
    pub fn invalidate_all(&self) {
        self.inner.role_cache.clear();
    }

    /// Get the number of cached entries (for monitoring).
    pub fn cache_size(&self) -> usize {
        self.inner.role_cache.len()
    }

    /// Create the super-admin role if it does not exist yet.
    pub async fn ensure_super_admin(&self) -> MenuResult<Role> {
        let code = self.inner.super_admin_code.clone();
        if let Some(role) = self.inner.storage.find_role_by_code(&code).await? {
            return Ok(role);
        }

        let role = self
            .inner
            .storage
            .create_role(CreateRole {
                code,
                name: "Super Administrator".to_string(),
                enabled: Some(true),
            })
            .await?;
        self.invalidate_all();
        info!(role_id = role.id, code = %role.code, "super-admin role created");
        Ok(role)
    }
}
