// src/router.rs

//! Node selection: given a leader, a method, and the active failover
//! policy, decides which node a dispatch should target.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::failure_counters::FailureCounters;
use crate::node::NodeDescriptor;
use crate::ports::Method;

/// The four failover policies a client can be configured with. The
/// default is the strict baseline: always the leader, fatal if absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailoverBehavior {
    ReadFromLeaderWriteToLeader,
    ReadFromAllWriteToLeader,
    ReadFromAllWriteToLeaderWithFailovers,
    ReadFromLeaderWriteToLeaderWithFailovers,
}

impl Default for FailoverBehavior {
    fn default() -> Self {
        FailoverBehavior::ReadFromLeaderWriteToLeader
    }
}

impl FailoverBehavior {
    /// Whether this policy tolerates a `None` leader at dispatch time by
    /// entering the failover walk, rather than failing immediately.
    pub fn tolerates_no_leader(self) -> bool {
        matches!(
            self,
            FailoverBehavior::ReadFromAllWriteToLeaderWithFailovers
                | FailoverBehavior::ReadFromLeaderWriteToLeaderWithFailovers
        )
    }

    fn reads_are_striped(self) -> bool {
        matches!(
            self,
            FailoverBehavior::ReadFromAllWriteToLeader
                | FailoverBehavior::ReadFromAllWriteToLeaderWithFailovers
        )
    }
}

/// The outcome of [`Router::select`].
pub enum Selection<C> {
    /// Dispatch to this node. `striped` is true iff this node was picked
    /// by the read-striping index rather than as the leader fallback.
    Node {
        node: Arc<NodeDescriptor<C>>,
        striped: bool,
    },
    /// No usable node right now; the caller should drive the failover walk.
    NeedsFailoverWalk,
    /// No usable node, and the policy does not tolerate it.
    Fatal,
}

/// Holds the mutable read-striping base. A negative value forces all
/// reads to the leader (used by [`StripingGuard`]).
pub struct Router {
    striping_base: AtomicI64,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            striping_base: AtomicI64::new(0),
        }
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_read_striping_base(&self, increment: bool) -> i64 {
        if increment {
            self.striping_base.fetch_add(1, Ordering::Relaxed)
        } else {
            self.striping_base.load(Ordering::Relaxed)
        }
    }

    /// Returns an RAII guard that forces all reads to the leader for its
    /// lifetime, restoring the previous striping base on drop (including
    /// on early return or unwind).
    pub fn force_read_from_master(&self) -> StripingGuard<'_> {
        let previous = self.striping_base.swap(-1, Ordering::Relaxed);
        StripingGuard {
            router: self,
            previous,
        }
    }

    /// Selects a dispatch target given the current leader, method, list
    /// of known nodes, and failure counters. `nodes` must include the
    /// leader when non-empty, per the refresher's contract.
    pub fn select<C>(
        &self,
        behavior: FailoverBehavior,
        leader: Option<Arc<NodeDescriptor<C>>>,
        method: Method,
        nodes: &[Arc<NodeDescriptor<C>>],
        failures: &FailureCounters,
    ) -> Selection<C> {
        let striping_base = self.striping_base.load(Ordering::Relaxed);
        let wants_striped_read = method == Method::Get && behavior.reads_are_striped() && striping_base >= 0;

        if wants_striped_read && !nodes.is_empty() {
            let idx = (striping_base as usize) % nodes.len();
            let candidate = &nodes[idx];
            if failures.eligible(&candidate.url) {
                return Selection::Node {
                    node: candidate.clone(),
                    striped: true,
                };
            }
        }

        match leader {
            Some(node) => Selection::Node {
                node,
                striped: false,
            },
            None if behavior.tolerates_no_leader() => Selection::NeedsFailoverWalk,
            None => Selection::Fatal,
        }
    }

    /// The eligible subset of `nodes`, in list order, for the failover
    /// walk the executor drives when no leader is available.
    pub fn failover_candidates<C>(
        &self,
        nodes: &[Arc<NodeDescriptor<C>>],
        failures: &FailureCounters,
    ) -> Vec<Arc<NodeDescriptor<C>>> {
        nodes
            .iter()
            .filter(|n| failures.eligible(&n.url))
            .cloned()
            .collect()
    }
}

/// RAII guard returned by [`Router::force_read_from_master`].
pub struct StripingGuard<'a> {
    router: &'a Router,
    previous: i64,
}

impl Drop for StripingGuard<'_> {
    fn drop(&mut self) {
        self.router
            .striping_base
            .store(self.previous, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_policy_is_fatal_without_leader() {
        let router = Router::new();
        let failures = FailureCounters::new();
        let selection: Selection<()> = router.select(
            FailoverBehavior::ReadFromLeaderWriteToLeader,
            None,
            Method::Write,
            &[],
            &failures,
        );
        assert!(matches!(selection, Selection::Fatal));
    }

    #[test]
    fn with_failovers_policy_walks_instead_of_failing() {
        let router = Router::new();
        let failures = FailureCounters::new();
        let selection: Selection<()> = router.select(
            FailoverBehavior::ReadFromLeaderWriteToLeaderWithFailovers,
            None,
            Method::Write,
            &[],
            &failures,
        );
        assert!(matches!(selection, Selection::NeedsFailoverWalk));
    }

    #[test]
    fn force_read_from_master_restores_on_drop() {
        let router = Router::new();
        assert_eq!(router.get_read_striping_base(false), 0);
        {
            let _guard = router.force_read_from_master();
            assert_eq!(router.get_read_striping_base(false), -1);
        }
        assert_eq!(router.get_read_striping_base(false), 0);
    }

    #[test]
    fn striped_read_falls_back_to_leader_when_candidate_ineligible() {
        let router = Router::new();
        let failures = FailureCounters::new();
        let a = Arc::new(NodeDescriptor::new("http://a", ()));
        let leader = Arc::new(NodeDescriptor::new("http://leader", ()));
        failures.increment("http://a");
        failures.increment("http://a");
        let selection = router.select(
            FailoverBehavior::ReadFromAllWriteToLeader,
            Some(leader.clone()),
            Method::Get,
            &[a],
            &failures,
        );
        match selection {
            Selection::Node { node, striped } => {
                assert_eq!(node.url, "http://leader");
                assert!(!striped, "ineligible striped candidate must fall back, not count as striped");
            }
            _ => panic!("expected a node"),
        }
    }
}
