//! Parent-chain rules over flat `(id, parent_id)` adjacency.
//!
//! Both storage backends load the adjacency inside their write transaction and
//! run these functions, so cycle checks and cascade collection behave the same
//! regardless of the database engine.

use std::collections::{HashMap, HashSet};

use crate::models::{MenuKind, MenuNode};

use super::{MenuError, MenuResult};

/// Map of node id to its declared parent.
pub type ParentMap = HashMap<i64, Option<i64>>;

/// Build a [`ParentMap`] from menu nodes.
pub fn parent_map<'a>(nodes: impl IntoIterator<Item = &'a MenuNode>) -> ParentMap {
    nodes.into_iter().map(|n| (n.id, n.parent_id)).collect()
}

/// Ensure `menu_id` may be placed under `proposed_parent`.
///
/// Walks the ancestor chain of the proposed parent and rejects the move if
/// `menu_id` appears in it. The parent must exist in `parents`.
pub fn check_parent(
    parents: &ParentMap,
    menu_id: i64,
    proposed_parent: Option<i64>,
) -> MenuResult<()> {
    let Some(parent) = proposed_parent else {
        return Ok(());
    };

    if parent == menu_id {
        return Err(MenuError::InvalidHierarchy(format!(
            "menu {menu_id} cannot be its own parent"
        )));
    }

    if !parents.contains_key(&parent) {
        return Err(MenuError::InvalidReference { ids: vec![parent] });
    }

    let mut seen = HashSet::new();
    let mut current = Some(parent);
    while let Some(id) = current {
        if id == menu_id {
            return Err(MenuError::InvalidHierarchy(format!(
                "moving menu {menu_id} under {parent} would make it its own ancestor"
            )));
        }
        // Stop on a pre-existing loop rather than spinning.
        if !seen.insert(id) {
            break;
        }
        current = parents.get(&id).copied().flatten();
    }

    Ok(())
}

/// Reject parents that cannot hold children.
pub fn check_parent_kind(parent: &MenuNode) -> MenuResult<()> {
    if parent.kind == MenuKind::Button {
        return Err(MenuError::InvalidHierarchy(format!(
            "button menu {} cannot have children",
            parent.id
        )));
    }
    Ok(())
}

/// Collect `root` and every descendant via iterative parent-id closure.
///
/// Returned ids are sorted ascending. Returns an empty list if `root` is not
/// in `parents`.
pub fn descendant_closure(parents: &ParentMap, root: i64) -> Vec<i64> {
    if !parents.contains_key(&root) {
        return Vec::new();
    }

    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for (&id, parent) in parents {
        if let Some(p) = *parent {
            children.entry(p).or_default().push(id);
        }
    }

    let mut collected = HashSet::from([root]);
    let mut frontier = vec![root];
    while let Some(id) = frontier.pop() {
        for &child in children.get(&id).into_iter().flatten() {
            if collected.insert(child) {
                frontier.push(child);
            }
        }
    }

    let mut ids: Vec<i64> = collected.into_iter().collect();
    ids.sort_unstable();
    ids
}

/// Ancestors of `id`, nearest first, limited to nodes present in `parents`.
pub fn ancestors(parents: &ParentMap, id: i64) -> Vec<i64> {
    let mut out = Vec::new();
    let mut seen = HashSet::from([id]);
    let mut current = parents.get(&id).copied().flatten();
    while let Some(p) = current {
        if !parents.contains_key(&p) || !seen.insert(p) {
            break;
        }
        out.push(p);
        current = parents.get(&p).copied().flatten();
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn map(pairs: &[(i64, Option<i64>)]) -> ParentMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn root_move_is_always_allowed() {
        let parents = map(&[(1, None), (2, Some(1))]);
        assert!(check_parent(&parents, 2, None).is_ok());
    }

    #[test]
    fn self_parent_is_rejected() {
        let parents = map(&[(1, None)]);
        assert!(matches!(
            check_parent(&parents, 1, Some(1)),
            Err(MenuError::InvalidHierarchy(_))
        ));
    }

    #[test]
    fn descendant_parent_is_rejected() {
        let parents = map(&[(1, None), (2, Some(1)), (3, Some(2))]);
        assert!(matches!(
            check_parent(&parents, 1, Some(3)),
            Err(MenuError::InvalidHierarchy(_))
        ));
        assert!(check_parent(&parents, 3, Some(1)).is_ok());
    }

    #[test]
    fn sibling_swap_cycle_is_rejected() {
        // 2 under 3 is fine; then 3 under 2 would close a loop.
        let mut parents = map(&[(1, None), (2, Some(1)), (3, Some(1))]);
        check_parent(&parents, 2, Some(3)).unwrap();
        parents.insert(2, Some(3));
        assert!(matches!(
            check_parent(&parents, 3, Some(2)),
            Err(MenuError::InvalidHierarchy(_))
        ));
    }

    #[test]
    fn missing_parent_is_invalid_reference() {
        let parents = map(&[(1, None)]);
        match check_parent(&parents, 1, Some(42)) {
            Err(MenuError::InvalidReference { ids }) => assert_eq!(ids, vec![42]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn existing_loop_does_not_hang() {
        let parents = map(&[(1, Some(2)), (2, Some(1)), (3, None)]);
        assert!(check_parent(&parents, 3, Some(1)).is_ok());
    }

    #[test]
    fn closure_collects_all_depths() {
        let parents = map(&[
            (1, None),
            (2, Some(1)),
            (3, Some(2)),
            (4, Some(3)),
            (5, Some(1)),
            (6, None),
        ]);
        assert_eq!(descendant_closure(&parents, 2), vec![2, 3, 4]);
        assert_eq!(descendant_closure(&parents, 1), vec![1, 2, 3, 4, 5]);
        assert_eq!(descendant_closure(&parents, 6), vec![6]);
        assert!(descendant_closure(&parents, 99).is_empty());
    }

    #[test]
    fn ancestors_nearest_first() {
        let parents = map(&[(1, None), (2, Some(1)), (3, Some(2)), (7, Some(99))]);
        assert_eq!(ancestors(&parents, 3), vec![2, 1]);
        assert!(ancestors(&parents, 1).is_empty());
        assert!(ancestors(&parents, 7).is_empty());
    }
}
