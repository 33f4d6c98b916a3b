//! Database models.

pub mod menu;
pub mod role;

pub use menu::{CreateMenuNode, MenuKind, MenuNode, UpdateMenuNode};
pub use role::{CreateRole, Page, Role, RoleFilter, UpdateRole};
