// src/node.rs

//! Node descriptors and per-call request context.

use std::sync::Arc;

/// Cluster-visibility hints a node reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterInfo {
    pub is_leader: bool,
    pub with_cluster_failover_header: bool,
}

/// An addressable cluster member.
///
/// Immutable once constructed (see the module-level note below): the
/// per-call failover-header hint that earlier designs stashed on the
/// descriptor itself now lives in [`RequestContext`], so two requests
/// racing against the same descriptor can never observe each other's
/// in-flight mutation.
#[derive(Debug, Clone)]
pub struct NodeDescriptor<C> {
    pub url: String,
    pub credentials: C,
    pub cluster_info: Option<ClusterInfo>,
}

impl<C> NodeDescriptor<C> {
    pub fn new(url: impl Into<String>, credentials: C) -> Self {
        Self {
            url: url.into(),
            credentials,
            cluster_info: None,
        }
    }

    pub fn with_cluster_info(mut self, info: ClusterInfo) -> Self {
        self.cluster_info = Some(info);
        self
    }

    pub fn is_leader(&self) -> bool {
        self.cluster_info.map(|c| c.is_leader).unwrap_or(false)
    }
}

impl<C> PartialEq for NodeDescriptor<C> {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl<C> Eq for NodeDescriptor<C> {}

/// Per-dispatch context the executor computes and hands to the operation
/// closure, so the transport collaborator can turn it into request headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    /// Always true: every request issued through this crate is cluster-aware.
    pub cluster_aware: bool,
    /// True iff this is a striped read under `ReadFromAllWriteToLeader`.
    pub read_behavior_all: bool,
    /// True iff this dispatch follows a prior failure under a
    /// with-failovers policy, or is part of the failover walk.
    pub failover_header: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            cluster_aware: true,
            read_behavior_all: false,
            failover_header: false,
        }
    }
}

pub(crate) fn find_or_clone<C: Clone>(
    nodes: &[Arc<NodeDescriptor<C>>],
    original: &Arc<NodeDescriptor<C>>,
    location: &str,
) -> Arc<NodeDescriptor<C>> {
    if let Some(found) = nodes.iter().find(|n| n.url == location) {
        return found.clone();
    }
    Arc::new(NodeDescriptor {
        url: location.to_string(),
        credentials: original.credentials.clone(),
        cluster_info: original.cluster_info,
    })
}
