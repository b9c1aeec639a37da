// src/lib.rs

//! Cluster-aware request executor for a replicated database client.
//!
//! This crate hides a multi-node cluster behind a single request-issuing
//! handle. It discovers topology and leadership, routes operations to the
//! right node under a configurable failover policy, and recovers from node
//! and cluster failures by retrying on surviving nodes.
//!
//! The low-level HTTP transport, credential objects, and the on-disk cache
//! format are deliberately left to the embedding application; this crate
//! consumes them through the small ports in [`ports`].

pub mod config;
pub mod error;
pub mod executor;
pub mod failure_counters;
pub mod leader_cell;
pub mod node;
pub mod ports;
pub mod refresher;
pub mod router;
pub mod topology;
pub mod topology_cache;

pub use config::ExecutorConfig;
pub use error::{ExecutorError, OperationError};
pub use executor::Executor;
pub use node::{ClusterInfo, NodeDescriptor, RequestContext};
pub use router::FailoverBehavior;
pub use topology::{ClientConfiguration, Destination, TopologyDocument};
