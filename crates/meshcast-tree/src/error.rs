//! Error types for meshcast-tree.

use thiserror::Error;

use crate::NodeId;

/// Result type for tree construction.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Reasons a parent array does not describe a valid rooted tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A tree needs at least one node.
    #[error("tree has no nodes")]
    Empty,

    /// The parent array and the identity list differ in length.
    #[error("{nodes} nodes but {parents} parent entries")]
    LengthMismatch { nodes: usize, parents: usize },

    /// The same identity appears twice.
    #[error("node {0} appears more than once")]
    DuplicateNode(NodeId),

    /// Every node has a parent.
    #[error("no root: every node has a parent")]
    NoRoot,

    /// More than one node has no parent.
    #[error("multiple roots at positions {first} and {second}")]
    MultipleRoots { first: usize, second: usize },

    /// A parent index points outside the node list.
    #[error("node at position {node} has out-of-range parent {parent}")]
    UnknownParent { node: usize, parent: usize },

    /// A node names itself as parent.
    #[error("node at position {0} is its own parent")]
    SelfParent(usize),

    /// Following parents from this node never reaches the root.
    #[error("node at position {0} is on a cycle or cut off from the root")]
    Cycle(usize),

    /// Branching factor of zero cannot span more than one node.
    #[error("branching factor must be at least 1")]
    ZeroBranching,
}
