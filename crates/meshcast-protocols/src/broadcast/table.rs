//! Per-node connection table.

use std::collections::HashMap;
use std::fmt;

use meshcast_tree::NodeId;
use serde::{Deserialize, Serialize};

use crate::transport::Connection;

/// Where a node stands with one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerState {
    /// Dial attempts still in flight.
    Pending,
    /// A dial succeeded; the link is held in the table.
    Connected,
    /// The retry budget ran out.
    Failed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Connected => write!(f, "Connected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// State of every peer a node must connect to, plus the live links.
///
/// Entries only ever leave `Pending`; a second outcome for the same peer
/// is ignored.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: HashMap<NodeId, PeerState>,
    links: HashMap<NodeId, Box<dyn Connection>>,
}

impl ConnectionTable {
    /// A table with every peer `Pending`.
    pub fn new(peers: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            entries: peers.into_iter().map(|p| (p, PeerState::Pending)).collect(),
            links: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self, peer: &NodeId) -> Option<PeerState> {
        self.entries.get(peer).copied()
    }

    /// Record a successful dial and keep the link. Returns `false` (and
    /// drops the link) if the peer is unknown or already settled.
    pub fn record_connected(&mut self, peer: NodeId, link: Box<dyn Connection>) -> bool {
        if !self.settle(peer, PeerState::Connected) {
            return false;
        }
        self.links.insert(peer, link);
        true
    }

    /// Record an exhausted retry budget. Returns `false` if the peer is
    /// unknown or already settled.
    pub fn record_failed(&mut self, peer: NodeId) -> bool {
        self.settle(peer, PeerState::Failed)
    }

    fn settle(&mut self, peer: NodeId, state: PeerState) -> bool {
        match self.entries.get_mut(&peer) {
            Some(entry) if *entry == PeerState::Pending => {
                *entry = state;
                true
            }
            _ => false,
        }
    }

    /// Number of peers in `state`.
    pub fn count(&self, state: PeerState) -> usize {
        self.entries.values().filter(|s| **s == state).count()
    }

    /// Peers in `state`, sorted for stable output.
    pub fn peers_in(&self, state: PeerState) -> Vec<NodeId> {
        let mut peers: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(p, _)| *p)
            .collect();
        peers.sort();
        peers
    }

    pub fn all_connected(&self) -> bool {
        self.entries.values().all(|s| *s == PeerState::Connected)
    }

    pub fn none_pending(&self) -> bool {
        self.entries.values().all(|s| *s != PeerState::Pending)
    }

    /// The held link to `peer`, if connected.
    pub fn link(&self, peer: &NodeId) -> Option<&dyn Connection> {
        self.links.get(peer).map(|l| l.as_ref())
    }

    /// Drop every held link. Returns how many were released.
    pub fn release(&mut self) -> usize {
        let released = self.links.len();
        self.links.clear();
        released
    }
}
