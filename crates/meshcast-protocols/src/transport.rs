//! Transport seams.
//!
//! Protocols never open sockets themselves. They dial peers through a
//! [`Dialer`] and send tree messages through an [`Outbox`]; whoever hosts
//! the protocol supplies both. [`TcpDialer`] is the plain TCP
//! implementation of the dialing side.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use meshcast_tree::{NodeId, NodeIdentity};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::trace;

use crate::message::Envelope;

/// Why a single dial attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialError {
    /// Nothing answered at the peer's endpoint.
    #[error("{0} is unreachable")]
    Unreachable(NodeId),

    /// The peer answered but refused the connection.
    #[error("{peer} refused the connection: {reason}")]
    Refused { peer: NodeId, reason: String },

    /// The attempt did not finish in time.
    #[error("dial to {0} timed out")]
    TimedOut(NodeId),

    /// Any other I/O failure.
    #[error("I/O error dialing {peer}: {reason}")]
    Io { peer: NodeId, reason: String },
}

/// Why a tree message could not be handed over.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No instance is known for this node.
    #[error("no route to {0}")]
    NoRoute(NodeId),

    /// The destination instance is gone.
    #[error("mailbox of {0} is closed")]
    Closed(NodeId),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

/// An established link to a peer. Dropping it releases the link.
pub trait Connection: Send + Sync + fmt::Debug {
    /// The node at the other end.
    fn peer(&self) -> NodeId;
}

/// Opens point-to-point connections. One call is one attempt; retrying is
/// the caller's business.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        from: &NodeIdentity,
        to: &NodeIdentity,
    ) -> Result<Box<dyn Connection>, DialError>;
}

/// Delivers tree messages to the instance of the same round on another node.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send(&self, to: &NodeIdentity, envelope: Envelope) -> Result<(), TransportError>;
}

/// A TCP stream to a peer.
#[derive(Debug)]
pub struct TcpConnection {
    peer: NodeId,
    stream: TcpStream,
}

impl TcpConnection {
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl Connection for TcpConnection {
    fn peer(&self) -> NodeId {
        self.peer
    }
}

/// Dials `to.addr` over TCP, bounding each attempt by `connect_timeout`.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(
        &self,
        from: &NodeIdentity,
        to: &NodeIdentity,
    ) -> Result<Box<dyn Connection>, DialError> {
        trace!(from = %from.id, to = %to, "TCP dial");
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(to.addr))
            .await
            .map_err(|_| DialError::TimedOut(to.id))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::ConnectionRefused => DialError::Refused {
                    peer: to.id,
                    reason: e.to_string(),
                },
                _ => DialError::Io {
                    peer: to.id,
                    reason: e.to_string(),
                },
            })?;
        Ok(Box::new(TcpConnection { peer: to.id, stream }))
    }
}
