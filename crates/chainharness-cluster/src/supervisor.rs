//! Cluster supervisor for managing multiple nodes.

use crate::{ClusterSpec, Error, NodeProcess, NodeStatus, Result};
use chainharness_rpc::RpcClient;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Owner of every node process in a test cluster.
///
/// Nodes are held in index order. Dropping the supervisor kills any process
/// still running.
pub struct ClusterSupervisor {
    spec: ClusterSpec,
    nodes: Vec<NodeProcess>,
    running: bool,
}

impl ClusterSupervisor {
    /// Creates a supervisor for `spec` without starting anything.
    pub fn new(spec: ClusterSpec) -> Result<Self> {
        if spec.is_empty() {
            return Err(Error::InvalidNodeCount(0));
        }

        let request_timeout = Duration::from_millis(spec.request_timeout_ms);
        let nodes = spec
            .nodes
            .iter()
            .cloned()
            .map(|node| NodeProcess::new(node, request_timeout))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            spec,
            nodes,
            running: false,
        })
    }

    /// Starts every node in index order and waits for each to become ready.
    ///
    /// If any node fails, the nodes already started are stopped before the
    /// error is returned.
    #[instrument(skip(self), fields(nodes = self.nodes.len(), workdir = %self.spec.workdir.display()))]
    pub async fn start_all(&mut self) -> Result<()> {
        self.spec.create_directories()?;
        self.spec.save()?;

        for index in 0..self.nodes.len() {
            let started = self.nodes[index]
                .start(&self.spec.timeouts, self.spec.log_tail_lines)
                .await;

            if let Err(e) = started {
                error!(node = index, error = %e, "node failed to start, tearing down cluster");
                self.stop_all().await;
                return Err(e);
            }
        }

        self.running = true;
        info!("cluster ready");
        Ok(())
    }

    /// Starts a specific node.
    pub async fn start_node(&mut self, index: usize) -> Result<()> {
        let node = self.nodes.get_mut(index).ok_or(Error::NodeNotFound(index))?;
        node.start(&self.spec.timeouts, self.spec.log_tail_lines).await
    }

    /// Stops every node. Failures are logged; calling it twice is harmless.
    #[instrument(skip(self), fields(nodes = self.nodes.len()))]
    pub async fn stop_all(&mut self) {
        let grace = self.spec.timeouts.shutdown_grace();
        for node in &mut self.nodes {
            if let Err(e) = node.stop(grace).await {
                warn!(node = node.index(), error = %e, "failed to stop node");
            }
        }

        if self.running {
            info!("cluster stopped");
        }
        self.running = false;
    }

    /// Stops and relaunches one node with new flags, keeping its index and
    /// data directory. `None` keeps the current flags.
    #[instrument(skip(self, args))]
    pub async fn restart_node(&mut self, index: usize, args: Option<Vec<String>>) -> Result<()> {
        let node = self.nodes.get_mut(index).ok_or(Error::NodeNotFound(index))?;
        let args = args.unwrap_or_else(|| node.spec().args.clone());
        node.restart(args, &self.spec.timeouts, self.spec.log_tail_lines)
            .await
    }

    /// Returns index, status and RPC port of every node, refreshing crash state.
    pub fn status(&mut self) -> Vec<(usize, NodeStatus, u16)> {
        self.nodes
            .iter_mut()
            .map(|node| {
                node.is_alive();
                (node.index(), node.status(), node.spec().rpc.port)
            })
            .collect()
    }

    /// Returns the number of nodes whose process is alive.
    pub fn running_count(&mut self) -> usize {
        self.nodes
            .iter_mut()
            .map(NodeProcess::is_alive)
            .filter(|alive| *alive)
            .count()
    }

    pub fn node(&self, index: usize) -> Result<&NodeProcess> {
        self.nodes.get(index).ok_or(Error::NodeNotFound(index))
    }

    pub fn nodes(&self) -> &[NodeProcess] {
        &self.nodes
    }

    /// RPC client for node `index`.
    pub fn client(&self, index: usize) -> Result<&RpcClient> {
        self.node(index).map(NodeProcess::client)
    }

    /// Tail of node `index`'s logs, for diagnostics.
    pub fn log_tail(&self, index: usize, lines: usize) -> Vec<String> {
        self.nodes
            .get(index)
            .map(|node| node.log_tail(lines))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    pub fn workdir(&self) -> &Path {
        &self.spec.workdir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainharness_config::HarnessConfig;
    use tempfile::TempDir;

    fn spec(temp: &TempDir, binary: &str, count: usize) -> ClusterSpec {
        let mut config = HarnessConfig::default();
        config.node.binary = binary.into();
        config.timeouts.startup_secs = 2;
        config.timeouts.poll_interval_ms = 50;
        ClusterSpec::uniform(&config, temp.path(), count, &[]).unwrap()
    }

    #[test]
    fn test_supervisor_creation() {
        let temp = TempDir::new().unwrap();
        let supervisor = ClusterSupervisor::new(spec(&temp, "chainharness-devnode", 3)).unwrap();

        assert_eq!(supervisor.len(), 3);
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.client(2).unwrap().label(), "node2");
    }

    #[test]
    fn test_node_not_found() {
        let temp = TempDir::new().unwrap();
        let supervisor = ClusterSupervisor::new(spec(&temp, "chainharness-devnode", 3)).unwrap();

        assert!(matches!(supervisor.client(10), Err(Error::NodeNotFound(10))));
        assert!(supervisor.log_tail(10, 5).is_empty());
    }

    #[tokio::test]
    async fn test_start_node_out_of_range() {
        let temp = TempDir::new().unwrap();
        let mut supervisor = ClusterSupervisor::new(spec(&temp, "chainharness-devnode", 3)).unwrap();

        let result = supervisor.start_node(10).await;
        assert!(matches!(result, Err(Error::NodeNotFound(10))));
    }

    #[test]
    fn test_status() {
        let temp = TempDir::new().unwrap();
        let mut supervisor = ClusterSupervisor::new(spec(&temp, "chainharness-devnode", 3)).unwrap();

        let status = supervisor.status();
        assert_eq!(status.len(), 3);
        assert_eq!(status[1], (1, NodeStatus::Stopped, 12_001));
        assert_eq!(supervisor.running_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_start_tears_down_and_writes_manifest() {
        let temp = TempDir::new().unwrap();
        let mut supervisor = ClusterSupervisor::new(spec(&temp, "/nonexistent/node-binary", 2)).unwrap();

        let err = supervisor.start_all().await.unwrap_err();
        assert!(matches!(err, Error::Startup(ref e) if e.node == 0));
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.running_count(), 0);
        assert!(temp.path().join("cluster.toml").exists());
    }

    #[tokio::test]
    async fn test_stop_all_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let mut supervisor = ClusterSupervisor::new(spec(&temp, "chainharness-devnode", 2)).unwrap();

        supervisor.stop_all().await;
        supervisor.stop_all().await;
        assert_eq!(supervisor.running_count(), 0);
    }
}
