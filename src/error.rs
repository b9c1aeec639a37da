// src/error.rs

//! Error types for the cluster executor.
//!
//! [`OperationError`] is produced by the caller-supplied operation closure
//! (and by the topology-fetch collaborator): it is the pre-classified
//! outcome of a single attempt against a node. [`ExecutorError`] is what
//! ultimately escapes [`crate::executor::Executor::execute`].

use std::fmt;

/// The classification of a single failed attempt against a node, as
/// produced by the transport collaborator. The executor never inspects
/// raw HTTP/socket errors directly; it only interprets this enum.
#[derive(Debug)]
pub enum OperationError {
    /// Connection refused, DNS failure, socket timeout, or read timeout.
    ServerDown,
    /// The node redirected the caller elsewhere.
    Redirect {
        location: Option<String>,
        has_leader_header: bool,
    },
    /// HTTP 417 Expectation Failed, treated as a transient retry signal.
    ExpectationFailed417,
    /// Any other error response; not retried.
    ErrorResponse(anyhow::Error),
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::ServerDown => write!(f, "server is down or unreachable"),
            OperationError::Redirect {
                location,
                has_leader_header,
            } => write!(
                f,
                "redirected to {:?} (leader header: {})",
                location, has_leader_header
            ),
            OperationError::ExpectationFailed417 => write!(f, "expectation failed (417)"),
            OperationError::ErrorResponse(e) => write!(f, "error response: {e}"),
        }
    }
}

impl std::error::Error for OperationError {}

/// Public error type returned by [`crate::executor::Executor::execute`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The cluster never settled on a leader within `wait_for_leader_timeout`
    /// under a strict (non-failover) policy.
    #[error("Cluster is not in a stable state, could not find a stable leader")]
    NoStableLeader,

    /// Retries (or the failover walk) were exhausted.
    #[error("Cluster is not reachable: {0}")]
    ClusterUnreachable(String),

    /// A node redirected without the leader-redirect hint.
    #[error("Got a redirect from {from} to {location:?}, but it was not a cluster leader redirect; maybe there is a proxy in the middle")]
    BadRedirect {
        from: String,
        location: Option<String>,
    },

    /// The caller's cancellation token fired.
    #[error("request was cancelled")]
    Cancelled,

    /// A non-retryable error surfaced by the user operation.
    #[error(transparent)]
    Operation(#[from] anyhow::Error),
}
