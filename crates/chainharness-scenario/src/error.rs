//! Scenario error taxonomy.

use chainharness_converge::ConvergeError;
use chainharness_rpc::RpcError;
use thiserror::Error;

/// A scenario assertion that did not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("assertion failed: {message}")]
pub struct AssertionFailure {
    pub message: String,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Anything that ends a scenario early.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// Startup, topology or other cluster failure.
    #[error(transparent)]
    Cluster(#[from] chainharness_cluster::Error),

    /// A convergence wait timed out or overshot.
    #[error(transparent)]
    Converge(#[from] ConvergeError),

    /// An RPC call failed where the scenario expected success.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    /// The working directory could not be prepared.
    #[error("working directory: {0}")]
    Workdir(#[from] std::io::Error),
}

impl ScenarioError {
    /// Short category name for summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ScenarioError::Cluster(chainharness_cluster::Error::Startup(_)) => "startup",
            ScenarioError::Cluster(chainharness_cluster::Error::Topology(_)) => "topology",
            ScenarioError::Cluster(_) => "cluster",
            ScenarioError::Converge(ConvergeError::Timeout(_)) => "timeout",
            ScenarioError::Converge(ConvergeError::Overshoot { .. }) => "overshoot",
            ScenarioError::Converge(ConvergeError::Rpc(_)) | ScenarioError::Rpc(_) => "rpc",
            ScenarioError::Assertion(_) => "assertion",
            ScenarioError::Workdir(_) => "workdir",
        }
    }

    /// Last value a failed wait observed, if this error came from one.
    pub fn last_observed(&self) -> Option<String> {
        match self {
            ScenarioError::Converge(e) => e.last_observed(),
            ScenarioError::Cluster(chainharness_cluster::Error::Topology(e)) => e.cause.last_observed(),
            _ => None,
        }
    }

    /// Node log lines carried by a startup failure.
    pub fn startup_log_tail(&self) -> Option<(usize, &[String])> {
        match self {
            ScenarioError::Cluster(chainharness_cluster::Error::Startup(e)) => Some((e.node, &e.log_tail)),
            _ => None,
        }
    }
}

/// Result type for scenario steps.
pub type Result<T> = std::result::Result<T, ScenarioError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chainharness_converge::TimeoutError;
    use std::time::Duration;

    #[test]
    fn test_kinds() {
        let timeout = ScenarioError::from(ConvergeError::from(TimeoutError {
            description: "chain height >= 3".to_string(),
            node: "node1".to_string(),
            elapsed: Duration::from_secs(5),
            attempts: 11,
            last_observed: "height 2".to_string(),
        }));
        assert_eq!(timeout.kind(), "timeout");
        assert_eq!(timeout.last_observed().as_deref(), Some("height 2"));

        let assertion = ScenarioError::from(AssertionFailure::new("inbox has 1 message"));
        assert_eq!(assertion.kind(), "assertion");
        assert_eq!(assertion.to_string(), "assertion failed: inbox has 1 message");
        assert!(assertion.last_observed().is_none());

        let missing = ScenarioError::from(chainharness_cluster::Error::NodeNotFound(7));
        assert_eq!(missing.kind(), "cluster");
    }
}
