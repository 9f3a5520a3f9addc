//! The per-node task that drives one Broadcast round.
//!
//! Everything that mutates the node's state happens on this task: dial
//! outcomes come back through a `JoinSet`, tree messages through the
//! inbox. Aborting the task drops the `JoinSet` (cancelling pending dials)
//! and the connection table (releasing held links).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use meshcast_tree::{NodeId, NodeIdentity};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use super::aggregator::{ChildReport, CompletionAggregator};
use super::connector::{ConnectionEstablisher, ConnectionResult};
use super::propagation::{Action, PropagationDriver};
use super::table::PeerState;
use super::NodeStatus;
use crate::message::{BroadcastMessage, Envelope, RoundId};
use crate::transport::Outbox;

/// Callback fired once when the node reaches `Done`.
pub type DoneCallback = Box<dyn FnOnce() + Send + 'static>;

/// Callbacks shared between the shell (which registers and cancels them)
/// and the task (which fires them).
#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) list: VecDeque<DoneCallback>,
    pub(crate) fired: bool,
    pub(crate) stopped: bool,
}

pub(crate) type SharedCallbacks = Arc<Mutex<Callbacks>>;

pub(crate) fn lock(callbacks: &SharedCallbacks) -> MutexGuard<'_, Callbacks> {
    callbacks.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct NodeTask {
    pub(crate) round: RoundId,
    pub(crate) me: NodeIdentity,
    pub(crate) peers: Vec<NodeIdentity>,
    pub(crate) outbox: Arc<dyn Outbox>,
    pub(crate) establisher: ConnectionEstablisher,
    pub(crate) aggregator: CompletionAggregator,
    pub(crate) driver: PropagationDriver,
    pub(crate) inbox: mpsc::UnboundedReceiver<Envelope>,
    pub(crate) callbacks: SharedCallbacks,
    pub(crate) status: watch::Sender<NodeStatus>,
}

impl NodeTask {
    pub(crate) async fn run(mut self) {
        let mut dials = JoinSet::new();
        for peer in std::mem::take(&mut self.peers) {
            let establisher = self.establisher.clone();
            let me = self.me;
            dials.spawn(async move {
                let result = establisher.connect(&me, &peer).await;
                (peer.id, result)
            });
        }
        info!(node = %self.me.id, round = %self.round, peers = dials.len(), "broadcast started");

        // Nodes with nothing to dial and no children are complete already.
        let actions = self.driver.advance(&self.aggregator);
        self.execute(actions).await;
        self.publish();

        loop {
            tokio::select! {
                Some(joined) = dials.join_next(), if !dials.is_empty() => match joined {
                    Ok((peer, result)) => self.on_connection(peer, result).await,
                    Err(e) => error!(node = %self.me.id, error = %e, "dial task failed"),
                },
                received = self.inbox.recv() => match received {
                    Some(envelope) => self.on_envelope(envelope).await,
                    None => {
                        debug!(node = %self.me.id, "inbox closed");
                        break;
                    }
                },
            }
        }

        let released = self.aggregator.release();
        debug!(node = %self.me.id, released, "node task finished");
    }

    async fn on_connection(&mut self, peer: NodeId, result: ConnectionResult) {
        self.aggregator.record_connection(peer, result);
        let actions = self.driver.advance(&self.aggregator);
        self.execute(actions).await;
        self.publish();
    }

    async fn on_envelope(&mut self, envelope: Envelope) {
        if envelope.round != self.round {
            warn!(
                node = %self.me.id,
                expected = %self.round,
                got = %envelope.round,
                "dropping message for another round"
            );
            return;
        }
        if self.driver.is_done() {
            trace!(node = %self.me.id, from = %envelope.from, "done, ignoring message");
            return;
        }

        let actions = match envelope.message {
            BroadcastMessage::SubtreeComplete => {
                match self.aggregator.record_child_report(envelope.from) {
                    ChildReport::Accepted => trace!(node = %self.me.id, child = %envelope.from, "child reported"),
                    ChildReport::Duplicate => debug!(node = %self.me.id, child = %envelope.from, "duplicate child report"),
                    ChildReport::NotAChild => warn!(node = %self.me.id, from = %envelope.from, "report from a node that is not our child"),
                }
                self.driver.advance(&self.aggregator)
            }
            BroadcastMessage::Done => self.driver.on_done(&envelope.from),
        };
        self.execute(actions).await;
        self.publish();
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::ReportToParent(parent) => {
                    self.send(&parent, BroadcastMessage::SubtreeComplete).await;
                }
                Action::AnnounceDone(children) => {
                    for child in &children {
                        self.send(child, BroadcastMessage::Done).await;
                    }
                }
                Action::Complete => self.complete(),
            }
        }
    }

    async fn send(&self, to: &NodeIdentity, message: BroadcastMessage) {
        let envelope = Envelope::new(self.round, self.me.id, message);
        if let Err(error) = self.outbox.send(to, envelope).await {
            warn!(node = %self.me.id, to = %to.id, ?message, %error, "failed to send tree message");
        }
    }

    fn complete(&self) {
        // Observers of the status see Done no later than the callbacks run.
        self.publish();
        let pending = {
            let mut guard = lock(&self.callbacks);
            if guard.stopped {
                return;
            }
            guard.fired = true;
            guard.list.len()
        };
        info!(
            node = %self.me.id,
            round = %self.round,
            callbacks = pending,
            "broadcast done"
        );
        // One at a time: a stop that lands between two callbacks cancels
        // the rest.
        loop {
            let next = {
                let mut guard = lock(&self.callbacks);
                if guard.stopped {
                    break;
                }
                guard.list.pop_front()
            };
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> NodeStatus {
        let table = self.aggregator.table();
        let subtree = self.aggregator.subtree();
        NodeStatus {
            node: self.me.id,
            phase: self.driver.phase(),
            connected: table.count(PeerState::Connected),
            failed: table.count(PeerState::Failed),
            pending: table.count(PeerState::Pending),
            children_reported: subtree.reported(),
            children_total: subtree.expected(),
            failed_peers: table.peers_in(PeerState::Failed),
        }
    }
}
