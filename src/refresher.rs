// src/refresher.rs

//! Single-flight background topology discovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::failure_counters::FailureCounters;
use crate::leader_cell::LeaderCell;
use crate::node::NodeDescriptor;
use crate::ports::{Clock, SystemClock, TopologyFetcher};
use crate::topology::select_winner;
use crate::topology_cache::TopologyCache;

/// A cloneable handle to an in-flight (or already-completed) refresh.
pub type RefreshHandle = Shared<BoxFuture<'static, ()>>;

const BACKOFF_BETWEEN_ROUNDS: Duration = Duration::from_millis(500);

pub struct TopologyRefresher<C> {
    nodes: ArcSwap<Vec<Arc<NodeDescriptor<C>>>>,
    leader: Arc<LeaderCell<C>>,
    failures: Arc<FailureCounters>,
    cache: TopologyCache<C>,
    fetcher: Arc<dyn TopologyFetcher<C>>,
    clock: Arc<dyn Clock>,
    inflight: Mutex<Option<RefreshHandle>>,
    first_time: AtomicBool,
    last_update: Mutex<Option<Instant>>,
    failover_servers: Vec<String>,
    topology_timeout: Duration,
    promote_primary_when_no_topology: bool,
}

impl<C: Clone + Send + Sync + 'static> TopologyRefresher<C> {
    pub fn new(
        leader: Arc<LeaderCell<C>>,
        failures: Arc<FailureCounters>,
        cache: TopologyCache<C>,
        fetcher: Arc<dyn TopologyFetcher<C>>,
        failover_servers: Vec<String>,
        topology_timeout: Duration,
        promote_primary_when_no_topology: bool,
    ) -> Self {
        Self {
            nodes: ArcSwap::from_pointee(Vec::new()),
            leader,
            failures,
            cache,
            fetcher,
            clock: Arc::new(SystemClock),
            inflight: Mutex::new(None),
            first_time: AtomicBool::new(true),
            last_update: Mutex::new(None),
            failover_servers,
            topology_timeout,
            promote_primary_when_no_topology,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn nodes(&self) -> Vec<Arc<NodeDescriptor<C>>> {
        (**self.nodes.load()).clone()
    }

    pub fn last_update(&self) -> Option<Instant> {
        *self.last_update.lock()
    }

    /// Returns a handle to the in-flight refresh if one is running,
    /// otherwise starts one. At most one refresh task runs at a time.
    pub fn request_refresh(self: &Arc<Self>, primary: Arc<NodeDescriptor<C>>) -> RefreshHandle {
        let mut inflight = self.inflight.lock();
        if let Some(handle) = inflight.as_ref() {
            return handle.clone();
        }
        let this = self.clone();
        let fut: BoxFuture<'static, ()> = async move { this.run_refresh_loop(primary).await }.boxed();
        let shared = fut.shared();
        *inflight = Some(shared.clone());
        let bg = shared.clone();
        tokio::spawn(async move {
            bg.await;
        });
        shared
    }

    async fn run_refresh_loop(self: Arc<Self>, primary: Arc<NodeDescriptor<C>>) {
        if self.first_time.swap(false, Ordering::SeqCst) {
            self.bootstrap_from_cache(&primary).await;
        }

        let mut tried_failover_servers = false;
        loop {
            let prev_leader = self.leader.get();
            let current_nodes = self.nodes();

            let probe_set: Vec<Arc<NodeDescriptor<C>>> = if !tried_failover_servers {
                if current_nodes.is_empty() {
                    vec![primary.clone()]
                } else {
                    current_nodes.clone()
                }
            } else {
                let mut set = vec![primary.clone()];
                set.extend(
                    self.failover_servers
                        .iter()
                        .map(|url| Arc::new(NodeDescriptor::new(url.clone(), primary.credentials.clone()))),
                );
                set
            };

            let winner = self.probe_all(&probe_set).await;

            match winner {
                None if !tried_failover_servers && !self.failover_servers.is_empty() => {
                    debug!("no topology document from any probed node, trying failover servers");
                    tried_failover_servers = true;
                    continue;
                }
                None => {
                    if self.promote_primary_when_no_topology {
                        warn!("no cluster topology found anywhere, promoting configured primary");
                        self.leader.set_if_nil(primary.clone(), true);
                    }
                    if self.nodes().is_empty() {
                        self.nodes.store(Arc::new(vec![primary.clone()]));
                    }
                    break;
                }
                Some((winner_node, doc)) => {
                    let mut new_nodes: Vec<Arc<NodeDescriptor<C>>> = doc
                        .destinations
                        .into_iter()
                        .filter_map(|d| d.into_node())
                        .map(Arc::new)
                        .collect();
                    let winner_descriptor = Arc::new(NodeDescriptor {
                        url: winner_node.url.clone(),
                        credentials: winner_node.credentials.clone(),
                        cluster_info: Some(doc.cluster_info),
                    });
                    if !new_nodes.iter().any(|n| n.url == winner_descriptor.url) {
                        new_nodes.push(winner_descriptor.clone());
                    }
                    self.nodes.store(Arc::new(new_nodes.clone()));
                    self.cache
                        .save(
                            &primary.url,
                            &new_nodes.iter().map(|n| (**n).clone()).collect::<Vec<_>>(),
                        )
                        .await;

                    if doc.cluster_info.is_leader {
                        info!(node = %winner_descriptor.url, "installing discovered leader");
                        self.leader.set_known_leader(winner_descriptor);
                        break;
                    }

                    let cleared = match &prev_leader {
                        Some(prev) => self.leader.compare_and_clear(prev),
                        None => true,
                    };
                    if !cleared && self.leader.get().is_some() {
                        break;
                    }
                    tokio::time::sleep(BACKOFF_BETWEEN_ROUNDS).await;
                }
            }
        }

        *self.inflight.lock() = None;
        *self.last_update.lock() = Some(self.clock.now());
    }

    async fn bootstrap_from_cache(&self, primary: &Arc<NodeDescriptor<C>>) {
        if let Some(cached) = self.cache.load(&primary.url).await {
            if cached.is_empty() {
                return;
            }
            let leader_entry = cached.iter().find(|n| n.is_leader()).cloned();
            let arcd: Vec<Arc<NodeDescriptor<C>>> = cached.into_iter().map(Arc::new).collect();
            self.nodes.store(Arc::new(arcd));
            match leader_entry {
                Some(leader) => self.leader.set_known_leader(Arc::new(leader)),
                None => self.leader.force_clear(),
            }
            debug!("bootstrapped node list from cache");
        }
    }

    async fn probe_all(
        &self,
        probe_set: &[Arc<NodeDescriptor<C>>],
    ) -> Option<(Arc<NodeDescriptor<C>>, crate::topology::TopologyDocument<C>)> {
        let mut join_set = JoinSet::new();
        for node in probe_set {
            let fetcher = self.fetcher.clone();
            let node = node.clone();
            join_set.spawn(async move {
                let doc = fetcher.fetch(node.clone()).await;
                (node, doc)
            });
        }

        let collected = tokio::time::timeout(self.topology_timeout, async {
            let mut out = Vec::new();
            while let Some(res) = join_set.join_next().await {
                if let Ok((node, doc)) = res {
                    if let Some(doc) = doc {
                        self.failures.reset(&node.url);
                        out.push((node, doc));
                    }
                }
            }
            out
        })
        .await
        .unwrap_or_default();

        select_winner(collected)
    }
}
