//! Tree builder: flat menu nodes to an ordered forest.
//!
//! Nodes are kept in a flat arena sorted by `(sort_rank, id)`. Child lists
//! hold arena indices, so tree views are read-only index traversals and the
//! output order never depends on hash map iteration.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::MenuNode;

/// Arena-backed menu forest.
#[derive(Debug, Clone, Default)]
pub struct MenuForest {
    nodes: Vec<MenuNode>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
    index: HashMap<i64, usize>,
}

impl MenuForest {
    /// Build a forest from any subset of menu nodes.
    ///
    /// Nodes whose parent is absent from the input become roots. Duplicate ids
    /// keep the first node in sibling order. A loop in the input (which the
    /// stores never persist) is broken by promoting one member to a root, so
    /// every input node appears exactly once.
    pub fn build(mut nodes: Vec<MenuNode>) -> Self {
        nodes.sort_by(|a, b| a.sort_rank.cmp(&b.sort_rank).then(a.id.cmp(&b.id)));
        let mut seen = HashSet::new();
        nodes.retain(|n| seen.insert(n.id));

        let index: HashMap<i64, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        let mut parent = vec![None; nodes.len()];
        let mut children = vec![Vec::new(); nodes.len()];
        let mut roots = Vec::new();

        // Arena order is sibling order, so pushing in index order keeps every
        // child list sorted.
        for (idx, node) in nodes.iter().enumerate() {
            let parent_idx = node
                .parent_id
                .filter(|p| *p != node.id)
                .and_then(|p| index.get(&p).copied());
            match parent_idx {
                Some(p) => {
                    parent[idx] = Some(p);
                    children[p].push(idx);
                }
                None => roots.push(idx),
            }
        }

        let mut forest = Self {
            nodes,
            parent,
            children,
            roots,
            index,
        };
        forest.break_cycles();
        forest
    }

    fn break_cycles(&mut self) {
        let mut reached = vec![false; self.nodes.len()];
        for &root in &self.roots {
            self.mark_reached(root, &mut reached);
        }

        for idx in 0..self.nodes.len() {
            if reached[idx] {
                continue;
            }
            // Every unreached node has a parent; climbing ends on a loop member.
            let mut on_path = HashSet::new();
            let mut member = idx;
            while on_path.insert(member) {
                match self.parent[member] {
                    Some(p) => member = p,
                    None => break,
                }
            }

            if let Some(p) = self.parent[member].take() {
                self.children[p].retain(|&c| c != member);
            }
            let pos = self.roots.partition_point(|&r| r < member);
            self.roots.insert(pos, member);
            tracing::warn!(
                menu_id = self.nodes[member].id,
                "menu hierarchy loop detected; promoting node to root"
            );
            self.mark_reached(member, &mut reached);
        }
    }

    fn mark_reached(&self, start: usize, reached: &mut [bool]) {
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            if !reached[idx] {
                reached[idx] = true;
                stack.extend(self.children[idx].iter().copied());
            }
        }
    }

    /// Number of nodes in the forest.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the forest has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` is in the forest.
    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    /// Root nodes in sibling order.
    pub fn roots(&self) -> impl Iterator<Item = MenuNodeRef<'_>> {
        self.roots.iter().map(|&idx| MenuNodeRef { forest: self, idx })
    }

    /// Look up a node by id.
    pub fn get(&self, id: i64) -> Option<MenuNodeRef<'_>> {
        self.index
            .get(&id)
            .map(|&idx| MenuNodeRef { forest: self, idx })
    }

    /// Node ids in depth-first pre-order.
    pub fn ids_depth_first(&self) -> Vec<i64> {
        self.pre_order()
            .into_iter()
            .map(|idx| self.nodes[idx].id)
            .collect()
    }

    /// Arena indices in depth-first pre-order.
    pub(crate) fn pre_order(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            out.push(idx);
            stack.extend(self.children[idx].iter().rev().copied());
        }
        out
    }

    /// Arena indices with every child before its parent.
    pub(crate) fn post_order(&self) -> Vec<usize> {
        let mut order = self.pre_order();
        order.reverse();
        order
    }

    pub(crate) fn index_of(&self, id: i64) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub(crate) fn node_at(&self, idx: usize) -> &MenuNode {
        &self.nodes[idx]
    }

    pub(crate) fn parent_of(&self, idx: usize) -> Option<usize> {
        self.parent[idx]
    }

    pub(crate) fn children_of(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }

    /// Owned nested trees, for serialization.
    pub fn to_trees(&self) -> Vec<MenuTree> {
        self.roots().map(|r| r.to_tree()).collect()
    }
}

/// Borrowed view of one node in a [`MenuForest`].
#[derive(Debug, Clone, Copy)]
pub struct MenuNodeRef<'a> {
    forest: &'a MenuForest,
    idx: usize,
}

impl<'a> MenuNodeRef<'a> {
    pub fn node(&self) -> &'a MenuNode {
        &self.forest.nodes[self.idx]
    }

    pub fn id(&self) -> i64 {
        self.node().id
    }

    pub fn is_leaf(&self) -> bool {
        self.forest.children[self.idx].is_empty()
    }

    pub fn parent(&self) -> Option<MenuNodeRef<'a>> {
        self.forest.parent[self.idx].map(|idx| MenuNodeRef {
            forest: self.forest,
            idx,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = MenuNodeRef<'a>> + 'a {
        let forest = self.forest;
        forest.children[self.idx]
            .iter()
            .map(move |&idx| MenuNodeRef { forest, idx })
    }

    /// Owned copy of the subtree rooted here.
    pub fn to_tree(&self) -> MenuTree {
        MenuTree {
            node: self.node().clone(),
            children: self.children().map(|c| c.to_tree()).collect(),
        }
    }
}

/// Nested menu tree as rendered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuTree {
    #[serde(flatten)]
    pub node: MenuNode,
    pub children: Vec<MenuTree>,
}

/// Build the ordered forest for a flat node list.
pub fn build_tree(nodes: Vec<MenuNode>) -> Vec<MenuTree> {
    MenuForest::build(nodes).to_trees()
}

/// Re-flatten a forest in depth-first pre-order.
pub fn flatten_ids(trees: &[MenuTree]) -> Vec<i64> {
    let mut out = Vec::new();
    collect_ids(trees, &mut out);
    out
}

fn collect_ids(trees: &[MenuTree], out: &mut Vec<i64>) {
    for tree in trees {
        out.push(tree.node.id);
        collect_ids(&tree.children, out);
    }
}
