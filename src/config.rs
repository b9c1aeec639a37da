// src/config.rs

//! Configuration surface for the cluster executor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::router::FailoverBehavior;

fn default_wait_for_leader_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_topology_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_number_of_retries() -> u32 {
    2
}

fn default_promote_primary_when_no_topology() -> bool {
    true
}

/// Tunables for an [`crate::executor::Executor`] instance. Deserializable
/// from TOML (or any other `serde` source); every field has a default so
/// a near-empty configuration file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How long a strict-policy request waits for the leader latch before
    /// failing with `NoStableLeader`.
    #[serde(with = "humantime_serde")]
    pub wait_for_leader_timeout: Duration,

    /// Overall deadline for a single topology-discovery fan-out round.
    #[serde(with = "humantime_serde")]
    pub replication_destinations_topology_timeout: Duration,

    /// Additional attempts after the first, before raising
    /// `ClusterUnreachable`. Total attempts = this + 1.
    pub number_of_retries: u32,

    /// Extra servers probed only after the known node list is exhausted
    /// without yielding a topology document.
    pub failover_servers: Vec<String>,

    /// The routing policy applied to every dispatch.
    pub failover_behavior: FailoverBehavior,

    /// Whether the refresher may promote the configured primary to
    /// "known leader" when no topology document can be obtained from any
    /// node and no failover servers are configured (or they too failed).
    pub promote_primary_when_no_topology: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            wait_for_leader_timeout: default_wait_for_leader_timeout(),
            replication_destinations_topology_timeout: default_topology_timeout(),
            number_of_retries: default_number_of_retries(),
            failover_servers: Vec::new(),
            failover_behavior: FailoverBehavior::default(),
            promote_primary_when_no_topology: default_promote_primary_when_no_topology(),
        }
    }
}

impl ExecutorConfig {
    /// Loads configuration from a TOML file, falling back to defaults
    /// for any field the file omits.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;
        let config: Self = builder.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the loaded configuration for internally-inconsistent
    /// values that `serde`'s defaulting cannot catch on its own.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.wait_for_leader_timeout.is_zero() {
            anyhow::bail!("wait_for_leader_timeout must be greater than zero");
        }
        if self.replication_destinations_topology_timeout.is_zero() {
            anyhow::bail!("replication_destinations_topology_timeout must be greater than zero");
        }
        Ok(())
    }
}
