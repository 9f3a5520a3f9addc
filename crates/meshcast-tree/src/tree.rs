//! Rooted overlay trees.
//!
//! A [`Tree`] is built once from a parent array and never mutated. The
//! parent and children relations are kept as index arrays so that
//! protocols walk the tree with plain lookups instead of recursion.

use std::collections::HashMap;

use crate::error::{Result, TreeError};
use crate::{NodeId, NodeIdentity};

/// An immutable rooted tree spanning a fixed set of nodes.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<NodeIdentity>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    depth: Vec<usize>,
    root: usize,
    index: HashMap<NodeId, usize>,
}

impl Tree {
    /// Build a tree from identities and a parallel parent array.
    ///
    /// `parents[i]` is the position of node `i`'s parent, or `None` for the
    /// root. Exactly one root is allowed and every node must reach it.
    pub fn from_parents(nodes: Vec<NodeIdentity>, parents: Vec<Option<usize>>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(TreeError::Empty);
        }
        if nodes.len() != parents.len() {
            return Err(TreeError::LengthMismatch {
                nodes: nodes.len(),
                parents: parents.len(),
            });
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (pos, node) in nodes.iter().enumerate() {
            if index.insert(node.id, pos).is_some() {
                return Err(TreeError::DuplicateNode(node.id));
            }
        }

        let mut root = None;
        let mut children = vec![Vec::new(); nodes.len()];
        for (pos, parent) in parents.iter().enumerate() {
            match *parent {
                None => match root {
                    None => root = Some(pos),
                    Some(first) => return Err(TreeError::MultipleRoots { first, second: pos }),
                },
                Some(p) if p >= nodes.len() => {
                    return Err(TreeError::UnknownParent { node: pos, parent: p })
                }
                Some(p) if p == pos => return Err(TreeError::SelfParent(pos)),
                Some(p) => children[p].push(pos),
            }
        }
        let root = root.ok_or(TreeError::NoRoot)?;
        let depth = compute_depths(&parents, root)?;

        Ok(Self {
            nodes,
            parent: parents,
            children,
            depth,
            root,
            index,
        })
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Trees are never empty; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All identities, in position order.
    pub fn nodes(&self) -> &[NodeIdentity] {
        &self.nodes
    }

    /// Position of the root.
    pub const fn root(&self) -> usize {
        self.root
    }

    pub fn root_identity(&self) -> &NodeIdentity {
        &self.nodes[self.root]
    }

    /// Identity at a position. Panics if `pos` is out of range.
    pub fn identity(&self, pos: usize) -> &NodeIdentity {
        &self.nodes[pos]
    }

    /// Position of a node, if it belongs to the tree.
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn parent(&self, pos: usize) -> Option<usize> {
        self.parent[pos]
    }

    pub fn children(&self, pos: usize) -> &[usize] {
        &self.children[pos]
    }

    pub fn is_root(&self, pos: usize) -> bool {
        pos == self.root
    }

    pub fn is_leaf(&self, pos: usize) -> bool {
        self.children[pos].is_empty()
    }

    /// Distance from the root (root has depth 0).
    pub fn depth(&self, pos: usize) -> usize {
        self.depth[pos]
    }

    /// Depth of the deepest node.
    pub fn height(&self) -> usize {
        self.depth.iter().copied().max().unwrap_or(0)
    }

    /// Every node except the one at `pos`. This is the set a node must
    /// connect to for the mesh to be complete.
    pub fn peers_of(&self, pos: usize) -> impl Iterator<Item = &NodeIdentity> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != pos)
            .map(|(_, n)| n)
    }

    /// The local view of one node: its parent and children identities.
    pub fn view(&self, id: &NodeId) -> Option<TreePosition> {
        let pos = self.position(id)?;
        Some(TreePosition {
            index: pos,
            identity: self.nodes[pos],
            parent: self.parent[pos].map(|p| self.nodes[p]),
            children: self.children[pos].iter().map(|&c| self.nodes[c]).collect(),
        })
    }
}

/// One node's place in a [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePosition {
    pub index: usize,
    pub identity: NodeIdentity,
    pub parent: Option<NodeIdentity>,
    pub children: Vec<NodeIdentity>,
}

impl TreePosition {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_child(&self, id: &NodeId) -> bool {
        self.children.iter().any(|c| c.id == *id)
    }

    pub fn is_parent(&self, id: &NodeId) -> bool {
        self.parent.is_some_and(|p| p.id == *id)
    }
}

/// Walk every node up to the root without recursion, rejecting cycles.
fn compute_depths(parents: &[Option<usize>], root: usize) -> Result<Vec<usize>> {
    const UNKNOWN: usize = usize::MAX;

    let mut depth = vec![UNKNOWN; parents.len()];
    depth[root] = 0;

    // Nodes on the current upward walk, waiting for their depth.
    let mut path = Vec::new();
    for start in 0..parents.len() {
        let mut cur = start;
        while depth[cur] == UNKNOWN {
            if path.len() >= parents.len() {
                return Err(TreeError::Cycle(start));
            }
            path.push(cur);
            match parents[cur] {
                Some(p) => cur = p,
                None => return Err(TreeError::Cycle(start)),
            }
        }
        let mut d = depth[cur];
        while let Some(node) = path.pop() {
            d += 1;
            depth[node] = d;
        }
    }
    Ok(depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_identities;
    use proptest::prelude::*;

    fn ids(n: usize) -> Vec<NodeIdentity> {
        local_identities(n, 9000)
    }

    #[test]
    fn root_with_two_children() {
        let tree = Tree::from_parents(ids(3), vec![None, Some(0), Some(0)]).unwrap();
        assert_eq!(tree.root(), 0);
        assert_eq!(tree.children(0), &[1, 2]);
        assert!(tree.is_leaf(1));
        assert_eq!(tree.parent(2), Some(0));
        assert_eq!(tree.height(), 1);
    }

    #[test]
    fn root_need_not_be_first() {
        let tree = Tree::from_parents(ids(3), vec![Some(2), Some(0), None]).unwrap();
        assert_eq!(tree.root(), 2);
        assert_eq!(tree.depth(1), 2);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Tree::from_parents(vec![], vec![]).unwrap_err(), TreeError::Empty);
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Tree::from_parents(ids(2), vec![None]).unwrap_err();
        assert_eq!(err, TreeError::LengthMismatch { nodes: 2, parents: 1 });
    }

    #[test]
    fn rejects_duplicates() {
        let mut nodes = ids(2);
        nodes[1] = nodes[0];
        let err = Tree::from_parents(nodes.clone(), vec![None, Some(0)]).unwrap_err();
        assert_eq!(err, TreeError::DuplicateNode(nodes[0].id));
    }

    #[test]
    fn rejects_two_roots() {
        let err = Tree::from_parents(ids(3), vec![None, Some(0), None]).unwrap_err();
        assert_eq!(err, TreeError::MultipleRoots { first: 0, second: 2 });
    }

    #[test]
    fn rejects_rootless() {
        let err = Tree::from_parents(ids(2), vec![Some(1), Some(0)]).unwrap_err();
        assert_eq!(err, TreeError::NoRoot);
    }

    #[test]
    fn rejects_self_parent() {
        let err = Tree::from_parents(ids(2), vec![None, Some(1)]).unwrap_err();
        assert_eq!(err, TreeError::SelfParent(1));
    }

    #[test]
    fn rejects_out_of_range_parent() {
        let err = Tree::from_parents(ids(2), vec![None, Some(5)]).unwrap_err();
        assert_eq!(err, TreeError::UnknownParent { node: 1, parent: 5 });
    }

    #[test]
    fn rejects_detached_cycle() {
        // 0 is root; 1 -> 2 -> 3 -> 1 never reaches it.
        let err = Tree::from_parents(ids(4), vec![None, Some(3), Some(1), Some(2)]).unwrap_err();
        assert!(matches!(err, TreeError::Cycle(_)));
    }

    #[test]
    fn view_exposes_neighbours() {
        let nodes = ids(4);
        let tree = Tree::from_parents(nodes.clone(), vec![None, Some(0), Some(0), Some(1)]).unwrap();

        let root = tree.view(&nodes[0].id).unwrap();
        assert!(root.is_root());
        assert!(root.is_child(&nodes[1].id));
        assert!(!root.is_child(&nodes[3].id));

        let mid = tree.view(&nodes[1].id).unwrap();
        assert!(mid.is_parent(&nodes[0].id));
        assert_eq!(mid.children, vec![nodes[3]]);

        assert!(tree.view(&crate::NodeId::from_seed(99)).is_none());
    }

    #[test]
    fn peers_exclude_self() {
        let tree = Tree::from_parents(ids(4), vec![None, Some(0), Some(0), Some(1)]).unwrap();
        let peers: Vec<_> = tree.peers_of(2).collect();
        assert_eq!(peers.len(), 3);
        assert!(!peers.contains(&tree.identity(2)));
    }

    proptest! {
        /// Any array where each node's parent precedes it is a valid tree.
        #[test]
        fn forward_parent_arrays_are_trees(picks in prop::collection::vec(any::<prop::sample::Index>(), 0..40)) {
            let n = picks.len() + 1;
            let mut parents = vec![None];
            for (i, pick) in picks.iter().enumerate() {
                parents.push(Some(pick.index(i + 1)));
            }
            let tree = Tree::from_parents(ids(n), parents.clone()).unwrap();

            prop_assert_eq!(tree.len(), n);
            let child_links: usize = (0..n).map(|p| tree.children(p).len()).sum();
            prop_assert_eq!(child_links, n - 1);
            for pos in 1..n {
                let parent = parents[pos].unwrap();
                prop_assert_eq!(tree.depth(pos), tree.depth(parent) + 1);
            }
        }

        /// Pointing the root at one of its descendants always breaks the tree.
        #[test]
        fn rerooting_into_descendant_is_rejected(picks in prop::collection::vec(any::<prop::sample::Index>(), 1..40), target in any::<prop::sample::Index>()) {
            let n = picks.len() + 1;
            let mut parents = vec![None];
            for (i, pick) in picks.iter().enumerate() {
                parents.push(Some(pick.index(i + 1)));
            }
            parents[0] = Some(1 + target.index(n - 1));
            prop_assert!(Tree::from_parents(ids(n), parents).is_err());
        }
    }
}
