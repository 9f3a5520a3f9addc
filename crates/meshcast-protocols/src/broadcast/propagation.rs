//! Tree-Propagation Driver.
//!
//! A synchronous state machine: it reads the aggregator's flags and the
//! `Done` messages from the parent, and answers with the [`Action`]s the
//! node must carry out. It never does I/O itself.
//!
//! ```text
//! Connecting ──direct complete──▶ AwaitingChildren ──all children──▶ SubtreeComplete
//!                                                                       │
//!                      root: immediately / others: Done from parent     ▼
//!                                                                      Done
//! ```

use std::fmt;

use meshcast_tree::{NodeId, NodeIdentity, TreePosition};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::aggregator::CompletionAggregator;

/// Where a node is in the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Direct dials in flight.
    Connecting,
    /// Own dials settled, waiting on child reports.
    AwaitingChildren,
    /// Own dials settled and every child reported.
    SubtreeComplete,
    /// Terminal.
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::AwaitingChildren => write!(f, "AwaitingChildren"),
            Self::SubtreeComplete => write!(f, "SubtreeComplete"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Side effects requested by the driver, in the order they must happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send `SubtreeComplete` to the parent.
    ReportToParent(NodeIdentity),
    /// Send `Done` to each child.
    AnnounceDone(Vec<NodeIdentity>),
    /// Fire the registered callbacks.
    Complete,
}

#[derive(Debug, Clone)]
pub struct PropagationDriver {
    position: TreePosition,
    phase: Phase,
    history: Vec<Phase>,
}

impl PropagationDriver {
    pub fn new(position: TreePosition) -> Self {
        Self {
            position,
            phase: Phase::Connecting,
            history: vec![Phase::Connecting],
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, in order.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn position(&self) -> &TreePosition {
        &self.position
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Move forward as far as the aggregator allows.
    ///
    /// Leaves go straight through `AwaitingChildren`; the root goes straight
    /// through `SubtreeComplete`.
    pub fn advance(&mut self, aggregator: &CompletionAggregator) -> Vec<Action> {
        let mut actions = Vec::new();

        if self.phase == Phase::Connecting && aggregator.direct_complete() {
            self.enter(Phase::AwaitingChildren);
        }

        if self.phase == Phase::AwaitingChildren && aggregator.subtree_complete() {
            self.enter(Phase::SubtreeComplete);
            match self.position.parent {
                Some(parent) => actions.push(Action::ReportToParent(parent)),
                None => actions.extend(self.finish()),
            }
        }

        actions
    }

    /// Handle a `Done` message. Only the parent may send one; anything else
    /// (including a second `Done`) is ignored.
    pub fn on_done(&mut self, from: &NodeId) -> Vec<Action> {
        if self.is_done() {
            debug!(%from, "already done, ignoring Done");
            return Vec::new();
        }
        if !self.position.is_parent(from) {
            warn!(%from, me = %self.position.identity.id, "Done from a node that is not our parent");
            return Vec::new();
        }
        if self.phase < Phase::SubtreeComplete {
            debug!(phase = %self.phase, "Done arrived before our subtree completed");
        }
        self.finish()
    }

    fn finish(&mut self) -> Vec<Action> {
        self.enter(Phase::Done);
        vec![Action::AnnounceDone(self.position.children.clone()), Action::Complete]
    }

    fn enter(&mut self, phase: Phase) {
        debug!(
            node = %self.position.identity.id,
            from = %self.phase,
            to = %phase,
            "phase transition"
        );
        self.phase = phase;
        self.history.push(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::connector::ConnectionResult;
    use crate::config::CompletionPolicy;
    use crate::transport::Connection;
    use meshcast_tree::{generate, local_identities, Tree};

    #[derive(Debug)]
    struct Link(NodeId);

    impl Connection for Link {
        fn peer(&self) -> NodeId {
            self.0
        }
    }

    fn connected(peer: NodeId) -> ConnectionResult {
        ConnectionResult::Connected {
            link: Box::new(Link(peer)),
            attempts: 1,
        }
    }

    /// Aggregator and driver for the node at `pos`.
    fn node(tree: &Tree, pos: usize) -> (CompletionAggregator, PropagationDriver) {
        let me = tree.identity(pos).id;
        let view = tree.view(&me).unwrap();
        let aggregator = CompletionAggregator::new(
            CompletionPolicy::Strict,
            tree.peers_of(pos).map(|p| p.id),
            view.children.iter().map(|c| c.id),
        );
        (aggregator, PropagationDriver::new(view))
    }

    fn connect_all(tree: &Tree, pos: usize, agg: &mut CompletionAggregator) {
        for peer in tree.peers_of(pos) {
            agg.record_connection(peer.id, connected(peer.id));
        }
    }

    #[test]
    fn root_with_two_children_walks_every_phase() {
        let tree = generate::star(local_identities(3, 6000)).unwrap();
        let (a, b) = (tree.identity(1).id, tree.identity(2).id);
        let (mut agg, mut root) = node(&tree, 0);

        assert!(root.advance(&agg).is_empty());
        assert_eq!(root.phase(), Phase::Connecting);

        connect_all(&tree, 0, &mut agg);
        assert!(root.advance(&agg).is_empty());
        assert_eq!(root.phase(), Phase::AwaitingChildren);

        agg.record_child_report(b);
        assert!(root.advance(&agg).is_empty());

        agg.record_child_report(a);
        let actions = root.advance(&agg);
        assert_eq!(
            actions,
            vec![
                Action::AnnounceDone(vec![*tree.identity(1), *tree.identity(2)]),
                Action::Complete
            ]
        );
        assert_eq!(
            root.history(),
            &[Phase::Connecting, Phase::AwaitingChildren, Phase::SubtreeComplete, Phase::Done]
        );

        // Inert afterwards.
        assert!(root.advance(&agg).is_empty());
        assert!(root.on_done(&a).is_empty());
    }

    #[test]
    fn leaf_reports_once_then_waits_for_parent() {
        let tree = generate::star(local_identities(3, 6000)).unwrap();
        let root = tree.identity(0);
        let (mut agg, mut leaf) = node(&tree, 1);

        connect_all(&tree, 1, &mut agg);
        assert_eq!(leaf.advance(&agg), vec![Action::ReportToParent(*root)]);
        assert_eq!(leaf.phase(), Phase::SubtreeComplete);
        assert_eq!(
            leaf.history(),
            &[Phase::Connecting, Phase::AwaitingChildren, Phase::SubtreeComplete]
        );

        // Re-advancing never repeats the report.
        assert!(leaf.advance(&agg).is_empty());

        assert_eq!(leaf.on_done(&root.id), vec![Action::AnnounceDone(vec![]), Action::Complete]);
        assert!(leaf.is_done());
        assert!(leaf.on_done(&root.id).is_empty());
    }

    #[test]
    fn done_from_non_parent_ignored() {
        let tree = generate::line(local_identities(3, 6000)).unwrap();
        let (_, mut tail) = node(&tree, 2);

        assert!(tail.on_done(&tree.identity(0).id).is_empty());
        assert_eq!(tail.phase(), Phase::Connecting);
        assert!(!tail.on_done(&tree.identity(1).id).is_empty());
    }

    #[test]
    fn middle_node_forwards_done_to_children() {
        let tree = generate::binary(local_identities(7, 6000)).unwrap();
        let (mut agg, mut mid) = node(&tree, 1);

        connect_all(&tree, 1, &mut agg);
        assert!(mid.advance(&agg).is_empty());
        agg.record_child_report(tree.identity(3).id);
        agg.record_child_report(tree.identity(4).id);
        assert_eq!(mid.advance(&agg), vec![Action::ReportToParent(*tree.identity(0))]);

        let actions = mid.on_done(&tree.identity(0).id);
        assert_eq!(
            actions,
            vec![
                Action::AnnounceDone(vec![*tree.identity(3), *tree.identity(4)]),
                Action::Complete
            ]
        );
    }

    #[test]
    fn single_node_round_finishes_on_first_advance() {
        let tree = generate::binary(local_identities(1, 6000)).unwrap();
        let (agg, mut only) = node(&tree, 0);

        assert_eq!(only.advance(&agg), vec![Action::AnnounceDone(vec![]), Action::Complete]);
        assert!(only.is_done());
    }
}
