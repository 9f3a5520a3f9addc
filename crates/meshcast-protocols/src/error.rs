//! Error types for meshcast-protocols.

use meshcast_tree::{NodeId, TreeError};
use thiserror::Error;

/// Result type for meshcast-protocols operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while creating or driving a protocol instance.
#[derive(Debug, Error)]
pub enum Error {
    /// The tree handed to the protocol is malformed.
    #[error("invalid tree: {0}")]
    Tree(#[from] TreeError),

    /// The local node is not part of the tree.
    #[error("node {0} is not part of the tree")]
    NotInTree(NodeId),

    /// No constructor is registered under this name.
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    /// A constructor is already registered under this name.
    #[error("protocol {0} is already registered")]
    DuplicateProtocol(String),

    /// `start` was called on a running instance.
    #[error("protocol instance already started")]
    AlreadyStarted,

    /// `start` was called outside a tokio runtime.
    #[error("no tokio runtime to run the protocol on")]
    NoRuntime,

    /// The instance has been stopped.
    #[error("protocol instance has been stopped")]
    Stopped,

    /// Configuration value is missing or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The round did not finish before the caller's deadline.
    #[error("round did not complete within {0:?}")]
    Timeout(std::time::Duration),
}
