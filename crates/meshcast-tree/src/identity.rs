//! Node identities.
//!
//! A [`NodeId`] is the BLAKE3 hash of whatever key material identifies a
//! node. It is opaque to the protocols: they only compare and hash it.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Unique node identifier (256-bit hash of the node's public key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash a public key to create a NodeId.
    pub fn from_public_key(pubkey: &[u8]) -> Self {
        Self(*blake3::hash(pubkey).as_bytes())
    }

    /// Deterministic id for the `seed`-th node of a local roster.
    pub fn from_seed(seed: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"meshcast/local-node");
        hasher.update(&seed.to_le_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..8])
    }
}

/// A node's identifier together with the endpoint peers dial to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeIdentity {
    pub id: NodeId,
    pub addr: SocketAddr,
}

impl NodeIdentity {
    pub const fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self { id, addr }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

/// Generate `count` identities on the loopback interface, one port each
/// starting at `base_port`.
pub fn local_identities(count: usize, base_port: u16) -> Vec<NodeIdentity> {
    (0..count)
        .map(|i| {
            let port = base_port.wrapping_add(i as u16);
            NodeIdentity::new(
                NodeId::from_seed(i as u64),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn seeded_ids_are_distinct() {
        let ids: HashSet<_> = (0..1000).map(NodeId::from_seed).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn public_key_hash_is_stable() {
        let a = NodeId::from_public_key(b"alice");
        let b = NodeId::from_public_key(b"alice");
        assert_eq!(a, b);
        assert_ne!(a, NodeId::from_public_key(b"bob"));
    }

    #[test]
    fn display_is_short_prefix() {
        let id = NodeId::from_seed(7);
        assert_eq!(id.to_string().len(), 8);
        assert!(id.to_hex().starts_with(&id.to_string()));
    }

    #[test]
    fn local_identities_use_consecutive_ports() {
        let ids = local_identities(3, 7000);
        let ports: Vec<_> = ids.iter().map(|n| n.addr.port()).collect();
        assert_eq!(ports, vec![7000, 7001, 7002]);
        assert!(ids.iter().all(|n| n.addr.ip().is_loopback()));
    }
}
