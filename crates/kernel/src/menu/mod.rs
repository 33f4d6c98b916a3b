//! Menu/permission tree engine.
//!
//! Menus are stored flat as an adjacency list and assembled into ordered
//! forests on demand:
//! - [`tree`] builds the nested view from any subset of nodes
//! - [`resolver`] answers which nodes a role may see, and what the editor shows
//! - [`selection`] derives tri-state checkbox state and the set to persist
//! - [`widget`] adapts that contract to checkbox-tree components

mod error;
pub mod hierarchy;
pub mod resolver;
pub mod selection;
pub mod tree;
pub mod widget;

pub use error::{MenuError, MenuResult};
pub use resolver::{EditorSummary, EditorView, PermissionResolver};
pub use selection::{CheckState, SelectionState};
pub use tree::{MenuForest, MenuNodeRef, MenuTree, build_tree, flatten_ids};
pub use widget::{CheckboxTreeWidget, WidgetBinding};
