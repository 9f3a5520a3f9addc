//! What every protocol instance looks like to its host.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use meshcast_tree::{NodeId, Tree};

use crate::config::BroadcastConfig;
use crate::error::Result;
use crate::message::{Mailbox, RoundId};
use crate::transport::{Dialer, Outbox};

/// Everything a protocol instance needs to run on one node.
#[derive(Clone)]
pub struct NodeContext {
    /// The tree shared by every node of the round.
    pub tree: Arc<Tree>,
    /// The node this instance runs on.
    pub node: NodeId,
    pub round: RoundId,
    pub config: BroadcastConfig,
    pub dialer: Arc<dyn Dialer>,
    pub outbox: Arc<dyn Outbox>,
}

impl NodeContext {
    pub fn new(
        tree: Arc<Tree>,
        node: NodeId,
        dialer: Arc<dyn Dialer>,
        outbox: Arc<dyn Outbox>,
    ) -> Self {
        Self {
            tree,
            node,
            round: RoundId(0),
            config: BroadcastConfig::default(),
            dialer,
            outbox,
        }
    }

    #[must_use]
    pub fn with_round(mut self, round: RoundId) -> Self {
        self.round = round;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: BroadcastConfig) -> Self {
        self.config = config;
        self
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("node", &self.node)
            .field("round", &self.round)
            .field("tree_size", &self.tree.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A protocol running on one node.
///
/// Hosts drive instances through this trait and downcast with
/// [`as_any_mut`](Self::as_any_mut) to reach protocol-specific calls such
/// as registering callbacks.
pub trait ProtocolInstance: Send {
    /// Registry name of the protocol.
    fn name(&self) -> &'static str;

    /// The node this instance runs on.
    fn node(&self) -> NodeId;

    /// Where the host delivers incoming messages.
    fn mailbox(&self) -> Mailbox;

    fn start(&mut self) -> Result<()>;

    /// Abort the instance. Idempotent.
    fn stop(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
