//! Local multi-node cluster management.
//!
//! Provides process orchestration for integration tests:
//! - Per-node data directories, config files and log capture
//! - Readiness probing and bounded, idempotent teardown
//! - Peer topology requests and their verification
//! - A `cluster.toml` manifest for post-failure inspection

pub mod config;
pub mod error;
pub mod node;
pub mod supervisor;
pub mod topology;

pub use config::{ClusterSpec, MANIFEST_FILE, NodeSpec, wait_settings};
pub use error::{Error, Result, StartupCause, StartupError, TopologyError};
pub use node::{NodeProcess, NodeStatus};
pub use supervisor::ClusterSupervisor;
pub use topology::{PeerLink, Topology};

/// Starts every node of `spec`; nothing is left running on failure.
pub async fn start_cluster(spec: ClusterSpec) -> Result<ClusterSupervisor> {
    let mut supervisor = ClusterSupervisor::new(spec)?;
    supervisor.start_all().await?;
    Ok(supervisor)
}

/// Stops a running cluster gracefully.
pub async fn stop_cluster(supervisor: &mut ClusterSupervisor) {
    supervisor.stop_all().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainharness_config::HarnessConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_start_cluster_with_missing_binary() {
        let temp = TempDir::new().unwrap();
        let mut config = HarnessConfig::default();
        config.node.binary = "/nonexistent/node".into();
        let spec = ClusterSpec::uniform(&config, temp.path(), 2, &[]).unwrap();

        let err = start_cluster(spec).await.err().unwrap();
        assert!(matches!(err, Error::Startup(_)));

        let loaded = ClusterSpec::load(temp.path()).unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
