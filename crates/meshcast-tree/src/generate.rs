//! Deterministic tree shapes over a list of identities.
//!
//! Nodes are placed in breadth-first order: the first identity becomes the
//! root and each following node hangs off the earliest node that still has
//! room for another child.

use crate::error::{Result, TreeError};
use crate::{local_identities, NodeIdentity, Tree};

/// Complete k-ary tree with `branching` children per inner node.
pub fn with_branching(nodes: Vec<NodeIdentity>, branching: usize) -> Result<Tree> {
    if branching == 0 && nodes.len() > 1 {
        return Err(TreeError::ZeroBranching);
    }
    let parents = (0..nodes.len())
        .map(|i| if i == 0 { None } else { Some((i - 1) / branching) })
        .collect();
    Tree::from_parents(nodes, parents)
}

/// Complete binary tree.
pub fn binary(nodes: Vec<NodeIdentity>) -> Result<Tree> {
    with_branching(nodes, 2)
}

/// Root with every other node as a direct child.
pub fn star(nodes: Vec<NodeIdentity>) -> Result<Tree> {
    let branching = nodes.len().saturating_sub(1).max(1);
    with_branching(nodes, branching)
}

/// A single chain from the root down to one leaf.
pub fn line(nodes: Vec<NodeIdentity>) -> Result<Tree> {
    with_branching(nodes, 1)
}

/// `count` loopback identities arranged with the given branching factor.
pub fn local_tree(count: usize, branching: usize, base_port: u16) -> Result<Tree> {
    with_branching(local_identities(count, base_port), branching)
}
