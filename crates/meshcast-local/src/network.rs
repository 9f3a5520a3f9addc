//! In-process transport with fault injection.
//!
//! [`LocalNetwork`] is the [`Outbox`] for every node of every local round,
//! and hands out one [`RoundDialer`] per round. Dials never touch a socket:
//! they succeed unless a fault says otherwise, and every successful dial
//! hands out a [`LocalConnection`] that is counted while it is alive. Tree
//! messages are routed to the mailbox registered for `(round, node)`.
//! Attempt counters are kept per round and dropped with the round.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use meshcast_protocols::{
    Connection, DialError, Dialer, Envelope, Mailbox, Outbox, RoundId, TransportError,
};
use meshcast_tree::{NodeId, NodeIdentity};
use tracing::{debug, trace};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Injected failures.
#[derive(Debug, Default)]
struct Faults {
    /// Nodes nobody can dial.
    unreachable: HashSet<NodeId>,
    /// Directed links that always fail, `(from, to)`.
    blocked: HashSet<(NodeId, NodeId)>,
    /// Number of leading attempts from each dialer that fail per node.
    flaky: HashMap<NodeId, u32>,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct Inner {
    mailboxes: Mutex<HashMap<(RoundId, NodeId), Mailbox>>,
    faults: Mutex<Faults>,
    attempts: Mutex<HashMap<(RoundId, NodeId, NodeId), u32>>,
    open: Arc<AtomicUsize>,
}

/// Shared in-process network. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct LocalNetwork {
    inner: Arc<Inner>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route envelopes for `(round, mailbox.node())` to `mailbox`.
    pub fn register(&self, round: RoundId, mailbox: Mailbox) {
        let node = mailbox.node();
        if lock(&self.inner.mailboxes).insert((round, node), mailbox).is_some() {
            debug!(%round, %node, "replaced mailbox");
        }
    }

    /// Forget every mailbox and attempt counter of `round`. Returns how
    /// many mailboxes were removed.
    pub fn unregister_round(&self, round: RoundId) -> usize {
        lock(&self.inner.attempts).retain(|(r, _, _), _| *r != round);
        let mut mailboxes = lock(&self.inner.mailboxes);
        let before = mailboxes.len();
        mailboxes.retain(|(r, _), _| *r != round);
        before - mailboxes.len()
    }

    /// The dialer nodes of `round` use. Its attempts are counted under
    /// `round`.
    pub fn dialer(&self, round: RoundId) -> RoundDialer {
        RoundDialer {
            network: self.clone(),
            round,
        }
    }

    /// Make `node` undialable (or dialable again).
    pub fn set_unreachable(&self, node: NodeId, unreachable: bool) {
        let mut faults = lock(&self.inner.faults);
        if unreachable {
            faults.unreachable.insert(node);
        } else {
            faults.unreachable.remove(&node);
        }
    }

    /// Make every dial from `from` to `to` fail. The reverse direction is
    /// unaffected.
    pub fn block_link(&self, from: NodeId, to: NodeId) {
        lock(&self.inner.faults).blocked.insert((from, to));
    }

    /// Fail the first `failures` attempts each dialer makes towards `node`.
    pub fn set_flaky(&self, node: NodeId, failures: u32) {
        lock(&self.inner.faults).flaky.insert(node, failures);
    }

    /// Delay every dial and every delivery by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.inner.faults).latency = latency;
    }

    /// Attempts `from` has made towards `to` in `round` so far.
    pub fn dial_attempts(&self, round: RoundId, from: &NodeId, to: &NodeId) -> u32 {
        lock(&self.inner.attempts)
            .get(&(round, *from, *to))
            .copied()
            .unwrap_or(0)
    }

    /// Largest attempt count over the directed pairs of `round`.
    pub fn max_dial_attempts(&self, round: RoundId) -> u32 {
        lock(&self.inner.attempts)
            .iter()
            .filter(|((r, _, _), _)| *r == round)
            .map(|(_, &n)| n)
            .max()
            .unwrap_or(0)
    }

    pub fn total_dial_attempts(&self, round: RoundId) -> u64 {
        lock(&self.inner.attempts)
            .iter()
            .filter(|((r, _, _), _)| *r == round)
            .map(|(_, &n)| u64::from(n))
            .sum()
    }

    /// Connections handed out and not yet dropped, over all rounds.
    pub fn open_connections(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    fn latency(&self) -> Option<Duration> {
        lock(&self.inner.faults).latency
    }

    /// Count the attempt and decide its fate.
    fn attempt(&self, round: RoundId, from: &NodeId, to: &NodeId) -> Result<u32, DialError> {
        let attempt = {
            let mut attempts = lock(&self.inner.attempts);
            let count = attempts.entry((round, *from, *to)).or_insert(0);
            *count += 1;
            *count
        };

        let faults = lock(&self.inner.faults);
        if faults.unreachable.contains(to) {
            return Err(DialError::Unreachable(*to));
        }
        if faults.blocked.contains(&(*from, *to)) {
            return Err(DialError::Refused {
                peer: *to,
                reason: "link blocked".into(),
            });
        }
        if faults.flaky.get(to).is_some_and(|&failures| attempt <= failures) {
            return Err(DialError::Io {
                peer: *to,
                reason: format!("flaky attempt {attempt}"),
            });
        }
        Ok(attempt)
    }
}

/// [`LocalNetwork`] dialing on behalf of one round.
#[derive(Debug, Clone)]
pub struct RoundDialer {
    network: LocalNetwork,
    round: RoundId,
}

impl RoundDialer {
    pub fn round(&self) -> RoundId {
        self.round
    }
}

#[async_trait]
impl Dialer for RoundDialer {
    async fn dial(
        &self,
        from: &NodeIdentity,
        to: &NodeIdentity,
    ) -> Result<Box<dyn Connection>, DialError> {
        let network = &self.network;
        if let Some(latency) = network.latency() {
            tokio::time::sleep(latency).await;
        }
        let attempt = network.attempt(self.round, &from.id, &to.id)?;
        trace!(round = %self.round, from = %from.id, to = %to.id, attempt, "local dial");
        network.inner.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LocalConnection {
            from: from.id,
            peer: to.id,
            open: network.inner.open.clone(),
        }))
    }
}

#[async_trait]
impl Outbox for LocalNetwork {
    async fn send(&self, to: &NodeIdentity, envelope: Envelope) -> Result<(), TransportError> {
        if let Some(latency) = self.latency() {
            tokio::time::sleep(latency).await;
        }
        let mailbox = lock(&self.inner.mailboxes)
            .get(&(envelope.round, to.id))
            .cloned()
            .ok_or(TransportError::NoRoute(to.id))?;
        trace!(to = %to.id, from = %envelope.from, message = ?envelope.message, "local delivery");
        mailbox.deliver(envelope)
    }
}

/// A link handed out by [`LocalNetwork`]. Dropping it closes it.
#[derive(Debug)]
pub struct LocalConnection {
    from: NodeId,
    peer: NodeId,
    open: Arc<AtomicUsize>,
}

impl LocalConnection {
    /// The node that dialed.
    pub fn origin(&self) -> NodeId {
        self.from
    }
}

impl Connection for LocalConnection {
    fn peer(&self) -> NodeId {
        self.peer
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
