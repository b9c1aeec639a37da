// src/ports.rs

//! Small collaborator interfaces the executor is built against. The
//! low-level HTTP transport, credential objects, and persisted-cache
//! format are all owned by the embedding application; this module
//! defines only the seams the core needs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::node::NodeDescriptor;
use crate::router::FailoverBehavior;
use crate::topology::{ClientConfiguration, TopologyDocument};

/// Fetches the topology document a node reports, e.g. by calling its
/// "get cluster topology" HTTP endpoint. Per-call timeouts are the
/// caller's/transport's responsibility, not this trait's.
#[async_trait]
pub trait TopologyFetcher<C>: Send + Sync {
    async fn fetch(&self, node: Arc<NodeDescriptor<C>>) -> Option<TopologyDocument<C>>;
}

/// Loads and stores a serialized snapshot of the known node list, keyed
/// by a hash derived from the primary node's URL. Best-effort: load
/// failures are treated as absent, save failures are logged and ignored.
#[async_trait]
pub trait TopologyPersistence<C>: Send + Sync {
    async fn load(&self, server_hash: &str) -> Option<Vec<NodeDescriptor<C>>>;
    async fn save(&self, server_hash: &str, nodes: &[NodeDescriptor<C>]);
}

/// A trivial in-memory reference implementation, useful for tests and as
/// documentation of the expected save-then-load round-trip contract.
pub struct InMemoryTopologyPersistence<C> {
    store: Mutex<HashMap<String, Vec<NodeDescriptor<C>>>>,
}

impl<C> InMemoryTopologyPersistence<C> {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<C: Clone + Send + Sync + 'static> TopologyPersistence<C> for InMemoryTopologyPersistence<C> {
    async fn load(&self, server_hash: &str) -> Option<Vec<NodeDescriptor<C>>> {
        self.store.lock().get(server_hash).cloned()
    }

    async fn save(&self, server_hash: &str, nodes: &[NodeDescriptor<C>]) {
        self.store
            .lock()
            .insert(server_hash.to_string(), nodes.to_vec());
    }
}

/// Read-only view of the current failover policy, mutable only through
/// topology-published [`ClientConfiguration`] overrides.
pub trait Conventions: Send + Sync {
    fn failover_behavior(&self) -> FailoverBehavior;
    fn update_from(&self, client_configuration: &ClientConfiguration);
}

/// The default conventions holder: an atomic cell over the configured
/// behavior, overridable by the cluster at runtime.
pub struct DefaultConventions {
    behavior: parking_lot::RwLock<FailoverBehavior>,
}

impl DefaultConventions {
    pub fn new(initial: FailoverBehavior) -> Self {
        Self {
            behavior: parking_lot::RwLock::new(initial),
        }
    }
}

impl Conventions for DefaultConventions {
    fn failover_behavior(&self) -> FailoverBehavior {
        *self.behavior.read()
    }

    fn update_from(&self, client_configuration: &ClientConfiguration) {
        if let Some(b) = client_configuration.failover_behavior {
            *self.behavior.write() = b;
        }
    }
}

/// What happened during a single attempt, for metrics purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Retry,
    Redirected,
    Failed,
}

/// The HTTP method class of a dispatched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Write,
}

pub trait Metrics: Send + Sync {
    fn record_attempt(&self, node: &str, method: Method, elapsed: Duration, outcome: AttemptOutcome);
}

/// A metrics sink that discards everything; the default when the
/// embedding application does not wire one up.
#[derive(Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_attempt(&self, _node: &str, _method: Method, _elapsed: Duration, _outcome: AttemptOutcome) {}
}

/// Testable source of "now", used for stamping `last_update` on the
/// refresher without binding the crate to wall-clock time in unit tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
