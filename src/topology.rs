// src/topology.rs

//! Topology documents returned by cluster nodes, and conversion of
//! replication destinations into routable node descriptors.

use std::sync::Arc;

use url::Url;

use crate::node::{ClusterInfo, NodeDescriptor};
use crate::router::FailoverBehavior;

/// A replication target as reported inside a [`TopologyDocument`].
#[derive(Debug, Clone)]
pub struct Destination<C> {
    pub url: String,
    pub client_visible_url: String,
    pub database: Option<String>,
    pub can_be_failover: bool,
    pub credentials: C,
    pub cluster_info: Option<ClusterInfo>,
}

impl<C: Clone> Destination<C> {
    /// Picks the visible URL (falling back to `url`), composes the
    /// `/databases/{db}` path when a database is specified, and returns
    /// `None` when the destination is not eligible for failover routing
    /// or carries no usable URL at all.
    pub fn into_node(self) -> Option<NodeDescriptor<C>> {
        if !self.can_be_failover {
            return None;
        }
        let base = if !self.client_visible_url.is_empty() {
            &self.client_visible_url
        } else {
            &self.url
        };
        if base.is_empty() {
            return None;
        }
        let final_url = match &self.database {
            Some(db) if !db.is_empty() => for_database(base, db).unwrap_or_else(|| base.clone()),
            _ => base.clone(),
        };
        Some(NodeDescriptor {
            url: final_url,
            credentials: self.credentials,
            cluster_info: self.cluster_info,
        })
    }
}

fn for_database(base: &str, db: &str) -> Option<String> {
    let mut parsed = Url::parse(base).ok()?;
    parsed.set_path(&format!("/databases/{db}"));
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Overrides to the client's failover behavior, as published by a node's
/// topology document. Applied via [`crate::ports::Conventions::update_from`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfiguration {
    pub failover_behavior: Option<FailoverBehavior>,
}

/// The response to "what is the cluster topology?", as reported by a
/// single probed node.
#[derive(Debug, Clone)]
pub struct TopologyDocument<C> {
    /// Monotonic election term.
    pub term: i64,
    pub cluster_commit_index: i64,
    pub cluster_info: ClusterInfo,
    pub destinations: Vec<Destination<C>>,
    pub client_configuration: Option<ClientConfiguration>,
}

impl<C> TopologyDocument<C> {
    /// Sort key used for winner selection: `(term, commit_index + is_leader)`.
    /// Selection among candidates must use a strict `>` fold so the
    /// first-seen candidate wins ties, never the last.
    pub fn rank(&self) -> (i64, i64) {
        let bonus = if self.cluster_info.is_leader { 1 } else { 0 };
        (self.term, self.cluster_commit_index + bonus)
    }
}

/// Picks the winning document among `candidates`, ties broken by
/// enumeration order (first-seen wins).
pub fn select_winner<C>(candidates: Vec<(Arc<NodeDescriptor<C>>, TopologyDocument<C>)>) -> Option<(Arc<NodeDescriptor<C>>, TopologyDocument<C>)> {
    let mut winner: Option<(Arc<NodeDescriptor<C>>, TopologyDocument<C>)> = None;
    for candidate in candidates {
        let replace = match &winner {
            None => true,
            Some((_, best)) => candidate.1.rank() > best.rank(),
        };
        if replace {
            winner = Some(candidate);
        }
    }
    winner
}
