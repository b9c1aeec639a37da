// tests/integration_test.rs

//! End-to-end scenarios exercised against the public `Executor` API,
//! mirroring the scenario table in the behavioral specification (S1-S8).
//! Unit-level coverage for individual components lives next to each
//! module under `#[cfg(test)]`; this file drives the whole stack.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cluster_request_executor::ports::{InMemoryTopologyPersistence, Method, TopologyFetcher};
use cluster_request_executor::{
    ClusterInfo, Destination, Executor, ExecutorConfig, FailoverBehavior, NodeDescriptor,
    OperationError, TopologyDocument,
};

type Creds = ();

fn fast_config(behavior: FailoverBehavior) -> ExecutorConfig {
    let mut config = ExecutorConfig::default();
    config.wait_for_leader_timeout = Duration::from_millis(150);
    config.replication_destinations_topology_timeout = Duration::from_millis(150);
    config.failover_behavior = behavior;
    config
}

/// Reports `leader_url` as leader among `members`, so every probed node
/// converges on the same topology document.
struct FixedTopology {
    leader_url: String,
    members: Vec<String>,
}

#[async_trait]
impl TopologyFetcher<Creds> for FixedTopology {
    async fn fetch(&self, node: Arc<NodeDescriptor<Creds>>) -> Option<TopologyDocument<Creds>> {
        let destinations = self
            .members
            .iter()
            .map(|url| Destination {
                url: url.clone(),
                client_visible_url: String::new(),
                database: None,
                can_be_failover: true,
                credentials: (),
                cluster_info: Some(ClusterInfo {
                    is_leader: *url == self.leader_url,
                    with_cluster_failover_header: true,
                }),
            })
            .collect();
        Some(TopologyDocument {
            term: 1,
            cluster_commit_index: 0,
            cluster_info: ClusterInfo {
                is_leader: node.url == self.leader_url,
                with_cluster_failover_header: true,
            },
            destinations,
            client_configuration: None,
        })
    }
}

/// Never reports a leader among `members`: used to force the router into
/// the failover walk instead of ever resolving a stable leader.
struct NoLeaderTopology {
    members: Vec<String>,
}

#[async_trait]
impl TopologyFetcher<Creds> for NoLeaderTopology {
    async fn fetch(&self, _node: Arc<NodeDescriptor<Creds>>) -> Option<TopologyDocument<Creds>> {
        let destinations = self
            .members
            .iter()
            .map(|url| Destination {
                url: url.clone(),
                client_visible_url: String::new(),
                database: None,
                can_be_failover: true,
                credentials: (),
                cluster_info: Some(ClusterInfo {
                    is_leader: false,
                    with_cluster_failover_header: true,
                }),
            })
            .collect();
        Some(TopologyDocument {
            term: 1,
            cluster_commit_index: 0,
            cluster_info: ClusterInfo {
                is_leader: false,
                with_cluster_failover_header: true,
            },
            destinations,
            client_configuration: None,
        })
    }
}

struct NeverRespondingTopology;

#[async_trait]
impl TopologyFetcher<Creds> for NeverRespondingTopology {
    async fn fetch(&self, _node: Arc<NodeDescriptor<Creds>>) -> Option<TopologyDocument<Creds>> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

fn executor_with(
    fetcher: Arc<dyn TopologyFetcher<Creds>>,
    config: ExecutorConfig,
) -> Executor<Creds> {
    let primary = NodeDescriptor::new("http://a", ());
    let persistence = Arc::new(InMemoryTopologyPersistence::<Creds>::new());
    Executor::new(primary, fetcher, persistence, config)
}

/// S5: failover walk. No leader is ever resolvable, so dispatch walks the
/// known node list; the first candidate is down, the second succeeds.
#[tokio::test]
async fn s5_failover_walk_skips_dead_node_and_succeeds_on_next() {
    let fetcher = Arc::new(NoLeaderTopology {
        members: vec!["http://a".into(), "http://b".into(), "http://c".into()],
    });
    let mut config = fast_config(FailoverBehavior::ReadFromLeaderWriteToLeaderWithFailovers);
    config.promote_primary_when_no_topology = false;
    let executor = executor_with(fetcher, config);

    let attempts: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let result = executor
        .execute(
            Method::Write,
            {
                let attempts = attempts.clone();
                move |node, ctx| {
                    let attempts = attempts.clone();
                    let url = node.url.clone();
                    async move {
                        attempts.lock().unwrap().push(url.clone());
                        assert!(ctx.failover_header, "failover walk must set the header hint");
                        if url == "http://a" {
                            Err(OperationError::ServerDown)
                        } else {
                            Ok::<_, OperationError>(url)
                        }
                    }
                }
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result, "http://b");
    let seen = attempts.lock().unwrap().clone();
    assert_eq!(seen.first().map(String::as_str), Some("http://a"));
    assert!(seen.contains(&"http://b".to_string()));
}

/// S7: cache bootstrap. A fresh executor whose persistence already holds a
/// snapshot with a known leader resolves that leader without waiting on a
/// network fetcher that never responds.
#[tokio::test]
async fn s7_cache_bootstrap_resolves_leader_without_waiting_on_network() {
    use cluster_request_executor::ports::TopologyPersistence;

    let persistence = Arc::new(InMemoryTopologyPersistence::<Creds>::new());
    let seeded = vec![
        NodeDescriptor::new("http://a", ()).with_cluster_info(ClusterInfo {
            is_leader: true,
            with_cluster_failover_header: false,
        }),
        NodeDescriptor::new("http://b", ()),
    ];
    let hash = cluster_request_executor::topology_cache::server_hash("http://a");
    persistence.save(&hash, &seeded).await;

    let mut config = fast_config(FailoverBehavior::ReadFromLeaderWriteToLeader);
    config.wait_for_leader_timeout = Duration::from_millis(50);
    let primary = NodeDescriptor::new("http://a", ());
    let executor = Executor::new(primary, Arc::new(NeverRespondingTopology), persistence, config);

    let result = executor
        .execute(
            Method::Write,
            |node, _ctx| {
                let url = node.url.clone();
                async move { Ok::<_, OperationError>(url) }
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result, "http://a");
}

/// S3: leader churn during a request is not an error and does not consume
/// the retry budget. Two requests race against the same leader snapshot:
/// one installs a new leader via a redirect hint, the other discovers the
/// rotation happened and retries for free even with zero retries
/// configured.
#[tokio::test]
async fn s3_leader_churn_retry_is_free() {
    let fetcher = Arc::new(FixedTopology {
        leader_url: "http://a".to_string(),
        members: vec!["http://a".into(), "http://b".into()],
    });
    let mut config = fast_config(FailoverBehavior::ReadFromLeaderWriteToLeader);
    config.number_of_retries = 0;
    let executor = executor_with(fetcher, config);

    // Prime topology so leader = "a" before racing.
    executor
        .execute(
            Method::Write,
            |node, _ctx| {
                let url = node.url.clone();
                async move { Ok::<_, OperationError>(url) }
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(executor.current_leader().unwrap().url, "http://a");

    let rotator = executor.clone();
    let rotator_task = tokio::spawn(async move {
        rotator
            .execute(
                Method::Write,
                |node, _ctx| {
                    let url = node.url.clone();
                    async move {
                        if url == "http://a" {
                            Err(OperationError::Redirect {
                                location: Some("http://b".to_string()),
                                has_leader_header: true,
                            })
                        } else {
                            Ok::<_, OperationError>(url)
                        }
                    }
                },
                CancellationToken::new(),
            )
            .await
    });

    let victim = executor.clone();
    let victim_task = tokio::spawn(async move {
        let victim_for_poll = victim.clone();
        victim
            .execute(
                Method::Write,
                move |node, _ctx| {
                    let executor = victim_for_poll.clone();
                    let url = node.url.clone();
                    async move {
                        // Wait for the rotator to have installed "b" before
                        // reporting this attempt against "a" as down, so the
                        // churn is guaranteed to already be visible when
                        // `execute`'s retry path runs `compare_and_clear`.
                        for _ in 0..200 {
                            if executor
                                .current_leader()
                                .map(|n| n.url == "http://b")
                                .unwrap_or(false)
                            {
                                break;
                            }
                            tokio::time::sleep(Duration::from_millis(2)).await;
                        }
                        if url == "http://a" {
                            Err(OperationError::ServerDown)
                        } else {
                            Ok::<_, OperationError>(url)
                        }
                    }
                },
                CancellationToken::new(),
            )
            .await
    });

    let (rotator_result, victim_result) = tokio::join!(rotator_task, victim_task);
    assert_eq!(rotator_result.unwrap().unwrap(), "http://b");
    // Even with zero configured retries, the victim succeeds: its only
    // failure was leader churn, which is free and re-dispatches to "b".
    assert_eq!(victim_result.unwrap().unwrap(), "http://b");
}

/// S6 (executor-level): a striped GET under `ReadFromAllWriteToLeader`
/// targets the computed index, not the leader, when that index is
/// eligible, and carries the `read_behavior_all` request-context hint.
#[tokio::test]
async fn s6_striped_read_targets_computed_index() {
    let fetcher = Arc::new(FixedTopology {
        leader_url: "http://a".to_string(),
        members: vec!["http://a".into(), "http://b".into(), "http://c".into()],
    });
    let config = fast_config(FailoverBehavior::ReadFromAllWriteToLeader);
    let executor = executor_with(fetcher, config);

    executor
        .execute(
            Method::Write,
            |node, _ctx| {
                let url = node.url.clone();
                async move { Ok::<_, OperationError>(url) }
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    while executor.get_read_striping_base(false) < 4 {
        executor.get_read_striping_base(true);
    }

    let result = executor
        .execute(
            Method::Get,
            |node, ctx| {
                let url = node.url.clone();
                async move {
                    assert!(ctx.read_behavior_all);
                    Ok::<_, OperationError>(url)
                }
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let nodes = executor.nodes();
    let expected = &nodes[4 % nodes.len()];
    assert_eq!(result, expected.url);
}
