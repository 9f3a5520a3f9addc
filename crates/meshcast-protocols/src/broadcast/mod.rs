//! Broadcast: turn a tree into a full mesh.
//!
//! Every node dials every other node. Completion travels up the tree as
//! `SubtreeComplete` reports and comes back down as `Done`, so the root
//! learns the whole mesh is up without anyone counting N×(N-1) links
//! centrally.
//!
//! # Pieces
//!
//! - [`connector`]: dials one peer with bounded retries.
//! - [`table`] and [`aggregator`]: per-node bookkeeping and completion flags.
//! - [`propagation`]: the `Connecting → AwaitingChildren → SubtreeComplete →
//!   Done` state machine.
//! - [`Broadcast`]: the per-node handle that ties them to a tokio task.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut broadcast = Broadcast::new(context)?;
//! let (tx, rx) = tokio::sync::oneshot::channel();
//! broadcast.register_on_done(move || { let _ = tx.send(()); });
//! broadcast.start()?;
//! tokio::time::timeout(config.round_timeout(tree.len()), rx).await??;
//! ```

pub mod aggregator;
pub mod connector;
mod node;
pub mod propagation;
pub mod table;

use std::any::Any;

use meshcast_tree::{NodeId, TreePosition};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::instance::{NodeContext, ProtocolInstance};
use crate::message::{Envelope, Mailbox};

use self::aggregator::CompletionAggregator;
use self::connector::ConnectionEstablisher;
use self::node::{lock, NodeTask, SharedCallbacks};
use self::propagation::{Phase, PropagationDriver};

pub use self::node::DoneCallback;

/// Snapshot of one node's progress, published after every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node: NodeId,
    pub phase: Phase,
    pub connected: usize,
    pub failed: usize,
    pub pending: usize,
    pub children_reported: usize,
    pub children_total: usize,
    /// Peers whose dial attempts ran out. Under strict completion any entry
    /// keeps the node in `Connecting`; under best-effort they are left out of
    /// the required set.
    pub failed_peers: Vec<NodeId>,
}

impl NodeStatus {
    fn initial(position: &TreePosition, peers: usize) -> Self {
        Self {
            node: position.identity.id,
            phase: Phase::Connecting,
            connected: 0,
            failed: 0,
            pending: peers,
            children_reported: 0,
            children_total: position.children.len(),
            failed_peers: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

/// One node's Broadcast instance.
///
/// Created idle. [`start`](Self::start) spawns the node task on the current
/// tokio runtime; [`stop`](Self::stop) aborts it. Messages delivered to the
/// [`mailbox`](Self::mailbox) before `start` are queued, not lost.
pub struct Broadcast {
    context: NodeContext,
    position: TreePosition,
    mailbox: Mailbox,
    inbox: Option<mpsc::UnboundedReceiver<Envelope>>,
    callbacks: SharedCallbacks,
    status_tx: Option<watch::Sender<NodeStatus>>,
    status_rx: watch::Receiver<NodeStatus>,
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl Broadcast {
    pub const NAME: &'static str = "Broadcast";

    /// Bind an instance to `context.node`'s position in `context.tree`.
    pub fn new(context: NodeContext) -> Result<Self> {
        context.config.validate()?;
        let position = context
            .tree
            .view(&context.node)
            .ok_or(Error::NotInTree(context.node))?;

        let (mailbox, inbox) = Mailbox::channel(context.node);
        let (status_tx, status_rx) =
            watch::channel(NodeStatus::initial(&position, context.tree.len() - 1));

        debug!(
            node = %context.node,
            round = %context.round,
            children = position.children.len(),
            root = position.is_root(),
            "created broadcast instance"
        );

        Ok(Self {
            context,
            position,
            mailbox,
            inbox: Some(inbox),
            callbacks: SharedCallbacks::default(),
            status_tx: Some(status_tx),
            status_rx,
            task: None,
            stopped: false,
        })
    }

    /// Add a callback to fire when this node reaches `Done`.
    ///
    /// Each callback fires exactly once. Callbacks registered after `Done`
    /// or after [`stop`](Self::stop) never fire.
    pub fn register_on_done<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut guard = lock(&self.callbacks);
        if guard.stopped || guard.fired {
            debug!(node = %self.context.node, "callback registered too late, it will not fire");
            return;
        }
        guard.list.push_back(Box::new(callback));
    }

    /// Begin the Connecting phase.
    pub fn start(&mut self) -> Result<()> {
        if self.stopped {
            return Err(Error::Stopped);
        }
        if self.task.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let (Some(inbox), Some(status)) = (self.inbox.take(), self.status_tx.take()) else {
            return Err(Error::AlreadyStarted);
        };

        let ctx = &self.context;
        let peers: Vec<_> = ctx.tree.peers_of(self.position.index).copied().collect();
        let task = NodeTask {
            round: ctx.round,
            me: self.position.identity,
            aggregator: CompletionAggregator::new(
                ctx.config.policy,
                peers.iter().map(|p| p.id),
                self.position.children.iter().map(|c| c.id),
            ),
            peers,
            outbox: ctx.outbox.clone(),
            establisher: ConnectionEstablisher::new(ctx.dialer.clone(), &ctx.config),
            driver: PropagationDriver::new(self.position.clone()),
            inbox,
            callbacks: self.callbacks.clone(),
            status,
        };
        self.task = Some(runtime.spawn(task.run()));
        Ok(())
    }

    /// Abort in-flight dials, release held links and cancel callbacks that
    /// have not fired yet.
    ///
    /// A callback already running when `stop` is called runs to the end; no
    /// other callback starts after `stop` returns.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let cancelled = {
            let mut guard = lock(&self.callbacks);
            guard.stopped = true;
            let cancelled = guard.list.len();
            guard.list.clear();
            cancelled
        };
        if let Some(task) = &self.task {
            task.abort();
        }
        self.inbox = None;
        info!(node = %self.context.node, round = %self.context.round, cancelled, "broadcast stopped");
    }

    /// [`stop`](Self::stop) and wait for the node task to wind down.
    pub async fn shutdown(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(node = %self.context.node, error = %e, "node task ended abnormally");
                }
            }
        }
    }

    /// Where the host delivers envelopes for this instance.
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }

    /// Latest published status.
    pub fn status(&self) -> NodeStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status_rx.clone()
    }

    pub fn position(&self) -> &TreePosition {
        &self.position
    }

    pub fn context(&self) -> &NodeContext {
        &self.context
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished()) && !self.stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl ProtocolInstance for Broadcast {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn node(&self) -> NodeId {
        self.context.node
    }

    fn mailbox(&self) -> Mailbox {
        Broadcast::mailbox(self)
    }

    fn start(&mut self) -> Result<()> {
        Broadcast::start(self)
    }

    fn stop(&mut self) {
        Broadcast::stop(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for Broadcast {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
