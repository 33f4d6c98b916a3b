//! Menu engine error types.

use thiserror::Error;

/// Errors produced by the menu/permission engine.
///
/// Every variant except [`MenuError::Storage`] is caused by caller input or by
/// the current state of the store, so none of them are retried.
#[derive(Debug, Error)]
pub enum MenuError {
    /// A role or menu node id does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// An assignment or parent reference names menu nodes that do not exist.
    #[error("unknown menu ids: {ids:?}")]
    InvalidReference { ids: Vec<i64> },

    /// A parent change would make a node its own ancestor, or hang a node under a button.
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Malformed node or role fields.
    #[error("{0}")]
    Validation(String),

    /// Infrastructure failure in the underlying store.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl MenuError {
    /// Shorthand for a missing menu node.
    pub fn menu_not_found(id: i64) -> Self {
        Self::NotFound { entity: "menu", id }
    }

    /// Shorthand for a missing role.
    pub fn role_not_found(id: i64) -> Self {
        Self::NotFound { entity: "role", id }
    }

    /// Stable machine-readable kind, surfaced to HTTP callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::InvalidReference { .. } => "InvalidReference",
            Self::InvalidHierarchy(_) => "InvalidHierarchy",
            Self::Validation(_) => "ValidationError",
            Self::Storage(_) => "StorageError",
        }
    }
}

impl From<sqlx::Error> for MenuError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(anyhow::Error::new(e))
    }
}

/// Result alias for engine operations.
pub type MenuResult<T> = Result<T, MenuError>;
