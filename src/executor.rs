// src/executor.rs

//! Public entry point: orchestrates leader discovery, routing, retries,
//! and failover for a single logical operation.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, OperationError};
use crate::failure_counters::FailureCounters;
use crate::leader_cell::LeaderCell;
use crate::node::{find_or_clone, NodeDescriptor, RequestContext};
use crate::ports::{Conventions, DefaultConventions, Method, TopologyFetcher, TopologyPersistence};
use crate::refresher::TopologyRefresher;
use crate::router::{Router, Selection};
use crate::topology_cache::TopologyCache;

/// The result of a single dispatch attempt, once classification has
/// decided whether it can be retried without propagating an error.
enum TryCallOutcome<T> {
    Success(T),
    Retry { was_timeout: bool },
    Failed(anyhow::Error),
}

/// Orchestrates leader discovery, routing, and retrying of operations
/// against a replicated cluster. Cheap to clone: internals are held
/// behind `Arc` and shared across clones.
pub struct Executor<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Executor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<C> {
    primary: Arc<NodeDescriptor<C>>,
    leader: Arc<LeaderCell<C>>,
    failures: Arc<FailureCounters>,
    router: Router,
    refresher: Arc<TopologyRefresher<C>>,
    conventions: Arc<dyn Conventions>,
    config: ExecutorConfig,
}

impl<C: Clone + Send + Sync + 'static> Executor<C> {
    pub fn new(
        primary: NodeDescriptor<C>,
        fetcher: Arc<dyn TopologyFetcher<C>>,
        persistence: Arc<dyn TopologyPersistence<C>>,
        config: ExecutorConfig,
    ) -> Self {
        let primary = Arc::new(primary);
        let leader = Arc::new(LeaderCell::new());
        let failures = Arc::new(FailureCounters::new());
        let cache = TopologyCache::new(persistence);
        let refresher = Arc::new(TopologyRefresher::new(
            leader.clone(),
            failures.clone(),
            cache,
            fetcher,
            config.failover_servers.clone(),
            config.replication_destinations_topology_timeout,
            config.promote_primary_when_no_topology,
        ));
        let conventions = Arc::new(DefaultConventions::new(config.failover_behavior));
        Self {
            inner: Arc::new(Inner {
                primary,
                leader,
                failures,
                router: Router::new(),
                refresher,
                conventions,
                config,
            }),
        }
    }

    /// Forces all `Get` dispatch to the current leader for the lifetime
    /// of the returned guard.
    pub fn force_read_from_master(&self) -> crate::router::StripingGuard<'_> {
        self.inner.router.force_read_from_master()
    }

    pub fn get_read_striping_base(&self, increment: bool) -> i64 {
        self.inner.router.get_read_striping_base(increment)
    }

    pub fn nodes(&self) -> Vec<Arc<NodeDescriptor<C>>> {
        self.inner.refresher.nodes()
    }

    pub fn current_leader(&self) -> Option<Arc<NodeDescriptor<C>>> {
        self.inner.leader.get()
    }

    /// Runs `operation` against a node selected according to the active
    /// failover policy, retrying up to `number_of_retries` times and
    /// following leader redirects and failover walks as needed.
    pub async fn execute<T, Op, Fut>(
        &self,
        method: Method,
        operation: Op,
        cancel: CancellationToken,
    ) -> Result<T, ExecutorError>
    where
        T: Send,
        Op: Fn(Arc<NodeDescriptor<C>>, RequestContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, OperationError>> + Send,
    {
        let inner = &self.inner;
        let mut retries_left = inner.config.number_of_retries;
        let mut carry_failover_header = false;

        loop {
            if cancel.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }

            let behavior = inner.conventions.failover_behavior();
            let mut node = inner.leader.get();

            if node.is_none() {
                let _ = inner.refresher.request_refresh(inner.primary.clone());
                let timed_out = !inner
                    .leader
                    .await_leader(inner.config.wait_for_leader_timeout, &cancel)
                    .await;
                if cancel.is_cancelled() {
                    return Err(ExecutorError::Cancelled);
                }
                if timed_out && !behavior.tolerates_no_leader() {
                    return Err(ExecutorError::NoStableLeader);
                }
                node = inner.leader.get();
            }

            let nodes = inner.refresher.nodes();
            let leader_before = node.clone();
            let selection = inner.router.select(behavior, node, method, &nodes, &inner.failures);

            let (chosen, striped) = match selection {
                Selection::Node { node, striped } => (node, striped),
                Selection::Fatal => {
                    return Err(ExecutorError::ClusterUnreachable(
                        "Cluster is not in a stable state".to_string(),
                    ))
                }
                Selection::NeedsFailoverWalk => {
                    return self
                        .run_failover_walk(method, &operation, &cancel, &nodes)
                        .await;
                }
            };

            let mut ctx = RequestContext::new();
            ctx.read_behavior_all = striped
                && matches!(behavior, crate::router::FailoverBehavior::ReadFromAllWriteToLeader);
            ctx.failover_header = carry_failover_header;

            let outcome = self
                .try_call(chosen.clone(), ctx, &operation, &cancel, false)
                .await;

            match outcome {
                Ok(TryCallOutcome::Success(value)) => return Ok(value),
                Ok(TryCallOutcome::Failed(err)) => return Err(ExecutorError::Operation(err)),
                Ok(TryCallOutcome::Retry { was_timeout }) => {
                    debug!(node = %chosen.url, was_timeout, "retryable failure, checking leader churn");
                    // Compare against the leader snapshot used for routing, not
                    // necessarily `chosen` itself (a striped read may target a
                    // replica while the leader cell is untouched).
                    let rotated_away = match &leader_before {
                        Some(prev) => !inner.leader.compare_and_clear(prev),
                        None => false,
                    };
                    if rotated_away {
                        // someone already rotated the leader away from what we
                        // used to pick this node; retry without spending budget.
                        continue;
                    }
                    inner.failures.increment(&chosen.url);
                    carry_failover_header = behavior.tolerates_no_leader();
                    let _ = inner.refresher.request_refresh(inner.primary.clone());
                    if retries_left == 0 {
                        return Err(ExecutorError::ClusterUnreachable(
                            "Cluster is not reachable. Out of retries.".to_string(),
                        ));
                    }
                    retries_left -= 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_failover_walk<T, Op, Fut>(
        &self,
        _method: Method,
        operation: &Op,
        cancel: &CancellationToken,
        nodes: &[Arc<NodeDescriptor<C>>],
    ) -> Result<T, ExecutorError>
    where
        T: Send,
        Op: Fn(Arc<NodeDescriptor<C>>, RequestContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, OperationError>> + Send,
    {
        let inner = &self.inner;
        let candidates = inner.router.failover_candidates(nodes, &inner.failures);
        if candidates.is_empty() {
            return Err(ExecutorError::ClusterUnreachable(
                "Cluster is not reachable.".to_string(),
            ));
        }

        let last_index = candidates.len() - 1;
        for (i, candidate) in candidates.into_iter().enumerate() {
            let avoid_throwing = i != last_index;
            let mut ctx = RequestContext::new();
            ctx.failover_header = true;

            match self
                .try_call(candidate.clone(), ctx, operation, cancel, avoid_throwing)
                .await
            {
                Ok(TryCallOutcome::Success(value)) => return Ok(value),
                Ok(TryCallOutcome::Retry { .. }) | Ok(TryCallOutcome::Failed(_)) => {
                    inner.failures.increment(&candidate.url);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        Err(ExecutorError::ClusterUnreachable(
            "Cluster is not reachable.".to_string(),
        ))
    }

    /// Invokes `operation` once against `node` and classifies the result.
    /// Boxed (`Box::pin`) to allow the bounded recursion needed to chase a
    /// leader-redirect hint without growing the future type indefinitely.
    fn try_call<'a, T, Op, Fut>(
        &'a self,
        node: Arc<NodeDescriptor<C>>,
        ctx: RequestContext,
        operation: &'a Op,
        cancel: &'a CancellationToken,
        avoid_throwing: bool,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<TryCallOutcome<T>, ExecutorError>> + Send + 'a>>
    where
        T: Send,
        Op: Fn(Arc<NodeDescriptor<C>>, RequestContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, OperationError>> + Send,
    {
        Box::pin(async move {
            let inner = &self.inner;
            let attempt = tokio::select! {
                res = operation(node.clone(), ctx) => res,
                _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
            };

            match attempt {
                Ok(value) => {
                    inner.failures.reset(&node.url);
                    Ok(TryCallOutcome::Success(value))
                }
                Err(OperationError::ServerDown) => Ok(TryCallOutcome::Retry { was_timeout: true }),
                Err(OperationError::ExpectationFailed417) => {
                    Ok(TryCallOutcome::Retry { was_timeout: false })
                }
                Err(OperationError::Redirect {
                    location,
                    has_leader_header,
                }) => {
                    if !has_leader_header {
                        return Err(ExecutorError::BadRedirect {
                            from: node.url.clone(),
                            location,
                        });
                    }
                    let Some(location) = location else {
                        return Err(ExecutorError::BadRedirect {
                            from: node.url.clone(),
                            location: None,
                        });
                    };
                    let nodes = inner.refresher.nodes();
                    let target = find_or_clone(&nodes, &node, &location);
                    info!(from = %node.url, to = %location, "following leader redirect");
                    inner.leader.set_known_leader(target.clone());
                    self.try_call(target, ctx, operation, cancel, avoid_throwing)
                        .await
                }
                Err(OperationError::ErrorResponse(err)) => {
                    warn!(node = %node.url, error = %err, "non-retryable error response");
                    if avoid_throwing {
                        Ok(TryCallOutcome::Failed(err))
                    } else {
                        Err(ExecutorError::Operation(err))
                    }
                }
            }
        })
    }
}
