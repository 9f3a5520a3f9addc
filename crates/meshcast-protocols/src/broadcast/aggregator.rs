//! Completion Aggregator.
//!
//! Folds dial outcomes and child reports into two latched flags: "direct
//! connections complete" and "subtree complete". Once set, a flag never
//! clears, so each transition is observed at most once.

use std::collections::HashSet;

use meshcast_tree::NodeId;
use tracing::{debug, trace};

use super::connector::ConnectionResult;
use super::table::{ConnectionTable, PeerState};
use crate::config::CompletionPolicy;

/// How a child report was treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildReport {
    /// First report from this child.
    Accepted,
    /// The child had already reported.
    Duplicate,
    /// The sender is not one of our children.
    NotAChild,
}

/// Children heard from versus children expected.
#[derive(Debug, Clone, Default)]
pub struct SubtreeStatus {
    expected: HashSet<NodeId>,
    reported: HashSet<NodeId>,
}

impl SubtreeStatus {
    pub fn new(children: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            expected: children.into_iter().collect(),
            reported: HashSet::new(),
        }
    }

    pub fn report(&mut self, child: NodeId) -> ChildReport {
        if !self.expected.contains(&child) {
            ChildReport::NotAChild
        } else if self.reported.insert(child) {
            ChildReport::Accepted
        } else {
            ChildReport::Duplicate
        }
    }

    pub fn reported(&self) -> usize {
        self.reported.len()
    }

    pub fn expected(&self) -> usize {
        self.expected.len()
    }

    pub fn all_reported(&self) -> bool {
        self.reported.len() == self.expected.len()
    }
}

#[derive(Debug)]
pub struct CompletionAggregator {
    policy: CompletionPolicy,
    table: ConnectionTable,
    children: SubtreeStatus,
    direct_complete: bool,
    subtree_complete: bool,
}

impl CompletionAggregator {
    pub fn new(
        policy: CompletionPolicy,
        peers: impl IntoIterator<Item = NodeId>,
        children: impl IntoIterator<Item = NodeId>,
    ) -> Self {
        let mut aggregator = Self {
            policy,
            table: ConnectionTable::new(peers),
            children: SubtreeStatus::new(children),
            direct_complete: false,
            subtree_complete: false,
        };
        // A lone node has nobody to dial and may already be complete.
        aggregator.refresh();
        aggregator
    }

    /// Apply one dial outcome. Returns `true` if the table changed.
    pub fn record_connection(&mut self, peer: NodeId, result: ConnectionResult) -> bool {
        let changed = match result {
            ConnectionResult::Connected { link, attempts } => {
                trace!(%peer, attempts, "peer connected");
                self.table.record_connected(peer, link)
            }
            ConnectionResult::Failed { attempts, error } => {
                debug!(%peer, attempts, %error, policy = %self.policy, "peer failed");
                self.table.record_failed(peer)
            }
        };
        if changed {
            self.refresh();
        }
        changed
    }

    /// Apply a `SubtreeComplete` report from `child`.
    pub fn record_child_report(&mut self, child: NodeId) -> ChildReport {
        let report = self.children.report(child);
        if report == ChildReport::Accepted {
            self.refresh();
        }
        report
    }

    fn refresh(&mut self) {
        if !self.direct_complete {
            self.direct_complete = match self.policy {
                CompletionPolicy::Strict => self.table.all_connected(),
                CompletionPolicy::BestEffort => self.table.none_pending(),
            };
            if self.direct_complete {
                debug!(
                    connected = self.table.count(PeerState::Connected),
                    failed = self.table.count(PeerState::Failed),
                    "direct connections complete"
                );
            }
        }
        if !self.subtree_complete && self.direct_complete && self.children.all_reported() {
            self.subtree_complete = true;
            debug!(children = self.children.expected(), "subtree complete");
        }
    }

    pub fn direct_complete(&self) -> bool {
        self.direct_complete
    }

    pub fn subtree_complete(&self) -> bool {
        self.subtree_complete
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    pub fn subtree(&self) -> &SubtreeStatus {
        &self.children
    }

    /// Drop every held link.
    pub fn release(&mut self) -> usize {
        self.table.release()
    }
}
