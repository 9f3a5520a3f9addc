//! Messages exchanged along tree edges.

use std::fmt;

use meshcast_tree::NodeId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::transport::TransportError;

/// Identifies one execution of a protocol over a tree, so that a node can
/// run several rounds side by side without mixing their messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round-{}", self.0)
    }
}

/// Tree messages of the Broadcast protocol. Neither carries a payload: the
/// sender's identity in the [`Envelope`] is all the receiver needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastMessage {
    /// Child → parent: the sender and all its descendants are connected.
    SubtreeComplete,
    /// Parent → child: the whole mesh is up.
    Done,
}

/// A message addressed to one protocol instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub round: RoundId,
    pub from: NodeId,
    pub message: BroadcastMessage,
}

impl Envelope {
    pub const fn new(round: RoundId, from: NodeId, message: BroadcastMessage) -> Self {
        Self { round, from, message }
    }
}

/// Sending half of an instance's inbox.
///
/// The dispatcher that owns the network side holds one of these per
/// instance and pushes every envelope for that instance through it.
#[derive(Debug, Clone)]
pub struct Mailbox {
    node: NodeId,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Mailbox {
    pub(crate) fn channel(node: NodeId) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { node, tx }, rx)
    }

    /// The node this mailbox delivers to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Queue an envelope. Fails only once the instance has been dropped.
    pub fn deliver(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.tx
            .send(envelope)
            .map_err(|_| TransportError::Closed(self.node))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
