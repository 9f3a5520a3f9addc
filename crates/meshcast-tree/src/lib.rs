//! Meshcast Overlay Trees
//!
//! Node identities and the rooted trees that Meshcast protocols run on.
//!
//! # Model
//!
//! Every participating node has a [`NodeIdentity`]: an opaque [`NodeId`]
//! plus the endpoint peers dial to reach it. A [`Tree`] arranges a fixed set
//! of identities under a single root. Construction validates the shape once
//! (one root, no cycles, every node reachable) so that protocols can treat
//! the tree as a precondition rather than re-checking it mid-round.
//!
//! The [`generate`] module builds the usual test shapes (binary, star, line
//! and general k-ary trees) in breadth-first order.

mod error;
pub mod generate;
mod identity;
mod tree;

pub use error::{Result, TreeError};
pub use identity::{local_identities, NodeId, NodeIdentity};
pub use tree::{Tree, TreePosition};

/// Default branching factor used by local test networks.
pub const DEFAULT_BRANCHING: usize = 2;
