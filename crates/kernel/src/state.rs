//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::{Config, StorageBackend};
use crate::db;
use crate::menu::PermissionResolver;
use crate::middleware::TokenVerifier;
use crate::permissions::PermissionService;
use crate::storage::{MemoryStorage, PermissionStorage, PgStorage};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Menu, role and assignment storage.
    storage: Arc<dyn PermissionStorage>,

    /// Navigation and editor tree resolution.
    resolver: PermissionResolver,

    /// Permission service for access control.
    permissions: PermissionService,

    /// Bearer token verification.
    tokens: TokenVerifier,
}

impl AppState {
    /// Create new application state from configuration.
    pub async fn new(config: &Config) -> Result<Self> {
        let storage: Arc<dyn PermissionStorage> = match config.storage_backend {
            StorageBackend::Postgres => {
                let pool = db::create_pool(config).await?;
                info!("connected to PostgreSQL");
                db::run_migrations(&pool).await?;
                Arc::new(PgStorage::new(pool))
            }
            StorageBackend::Memory => {
                info!("using in-memory storage");
                Arc::new(MemoryStorage::new())
            }
        };

        let state = Self::with_storage(
            storage,
            &config.super_admin_role_code,
            config.jwt_secret.as_bytes(),
        );
        let admin = state.permissions().ensure_super_admin().await?;
        info!(role_id = admin.id, code = %admin.code, "super-admin role ready");

        Ok(state)
    }

    /// Assemble state around an existing storage backend.
    pub fn with_storage(
        storage: Arc<dyn PermissionStorage>,
        super_admin_code: &str,
        jwt_secret: &[u8],
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                resolver: PermissionResolver::new(storage.clone()),
                permissions: PermissionService::new(storage.clone(), super_admin_code),
                tokens: TokenVerifier::new(jwt_secret),
                storage,
            }),
        }
    }

    pub fn storage(&self) -> &Arc<dyn PermissionStorage> {
        &self.inner.storage
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.inner.resolver
    }

    pub fn permissions(&self) -> &PermissionService {
        &self.inner.permissions
    }

    pub fn tokens(&self) -> &TokenVerifier {
        &self.inner.tokens
    }

    /// Check if the storage backend is reachable.
    pub async fn storage_healthy(&self) -> bool {
        self.inner.storage.ping().await
    }
}
