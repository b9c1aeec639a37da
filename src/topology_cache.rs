// src/topology_cache.rs

//! Keys the persisted node-list snapshot by a hash of the primary node's
//! url, and mediates access to the injected [`TopologyPersistence`] port.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::node::NodeDescriptor;
use crate::ports::TopologyPersistence;

/// Derives the cache key for a primary node url: SHA-256 over the url,
/// hex-encoded and truncated to 16 characters, mirroring the hex-id
/// idiom used elsewhere for short, stable identifiers.
pub fn server_hash(primary_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(primary_url.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

pub struct TopologyCache<C> {
    persistence: Arc<dyn TopologyPersistence<C>>,
}

impl<C: Clone + Send + Sync + 'static> TopologyCache<C> {
    pub fn new(persistence: Arc<dyn TopologyPersistence<C>>) -> Self {
        Self { persistence }
    }

    pub async fn load(&self, primary_url: &str) -> Option<Vec<NodeDescriptor<C>>> {
        let hash = server_hash(primary_url);
        self.persistence.load(&hash).await
    }

    pub async fn save(&self, primary_url: &str, nodes: &[NodeDescriptor<C>]) {
        let hash = server_hash(primary_url);
        self.persistence.save(&hash, nodes).await;
    }
}
