//! Meshcast Protocols - Tree-Driven Collective Protocols
//!
//! Protocols in this crate run one instance per node of a rooted
//! [`Tree`](meshcast_tree::Tree) and use the tree edges to agree on when a
//! collective step is finished.
//!
//! # Overview
//!
//! ## Broadcast
//!
//! The [`Broadcast`] protocol turns the tree's sparse parent/child links into
//! a full mesh:
//!
//! - **All-to-all dialing**: every node dials every other node with bounded
//!   retry ([`BroadcastConfig::retry_max`] attempts, [`BroadcastConfig::retry_wait`]
//!   apart)
//! - **Upward aggregation**: a node reports `SubtreeComplete` to its parent
//!   once its own dials and all its children are complete
//! - **Downward release**: the root answers with `Done`, which flows back to
//!   every leaf; each node fires its callbacks exactly once on the way
//!
//! ## Hosting
//!
//! Instances never touch the network directly. The host supplies a
//! [`Dialer`] and an [`Outbox`] through the [`NodeContext`], and delivers
//! incoming [`Envelope`]s to each instance's [`Mailbox`]. Instances are
//! created by name through a [`ProtocolRegistry`].
//!
//! # Example
//!
//! ```rust,ignore
//! use meshcast_protocols::{ProtocolRegistry, NodeContext, Broadcast};
//!
//! let registry = ProtocolRegistry::with_builtin()?;
//! let ctx = NodeContext::new(tree.clone(), my_id, dialer, outbox);
//! let mut instance = registry.create(Broadcast::NAME, ctx)?;
//! instance.start()?;
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod instance;
pub mod message;
pub mod registry;
pub mod transport;

pub use broadcast::propagation::Phase;
pub use broadcast::table::PeerState;
pub use broadcast::{Broadcast, DoneCallback, NodeStatus};
pub use config::{BroadcastConfig, CompletionPolicy};
pub use error::{Error, Result};
pub use instance::{NodeContext, ProtocolInstance};
pub use message::{BroadcastMessage, Envelope, Mailbox, RoundId};
pub use registry::{Constructor, ProtocolRegistry};
pub use transport::{Connection, DialError, Dialer, Outbox, TcpDialer, TransportError};

/// Register every protocol shipped with this crate.
pub fn register_builtin(registry: &mut ProtocolRegistry) -> Result<()> {
    registry.register(Broadcast::NAME, |ctx| {
        Ok(Box::new(Broadcast::new(ctx)?) as Box<dyn ProtocolInstance>)
    })
}
