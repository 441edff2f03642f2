//! Peer links between cluster nodes.
//!
//! Links are advisory: the nodes own their real connections. The topology
//! records what was requested and checks that the nodes report it.

use crate::error::TopologyError;
use crate::{ClusterSupervisor, Error, Result};
use chainharness_converge::{ConvergeError, WaitSettings, await_peer_connected};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// A requested connection between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerLink {
    pub from: usize,
    pub to: usize,
    pub bidirectional: bool,
}

impl PeerLink {
    /// Directed connections the link implies, as (dialer, listener).
    pub fn directions(&self) -> Vec<(usize, usize)> {
        if self.bidirectional {
            vec![(self.from, self.to), (self.to, self.from)]
        } else {
            vec![(self.from, self.to)]
        }
    }
}

impl fmt::Display for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.bidirectional { "<->" } else { "->" };
        write!(f, "node{} {arrow} node{}", self.from, self.to)
    }
}

/// Links requested so far, in request order.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: Vec<PeerLink>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links(&self) -> &[PeerLink] {
        &self.links
    }

    /// Asks `from` to dial `to` (and the reverse when `bidirectional`) and
    /// records the link.
    pub async fn connect(
        &mut self,
        cluster: &ClusterSupervisor,
        from: usize,
        to: usize,
        bidirectional: bool,
    ) -> Result<PeerLink> {
        let link = PeerLink {
            from,
            to,
            bidirectional,
        };
        if from == to {
            return Err(Error::Config(format!("peer link {link} connects a node to itself")));
        }

        for (dialer, listener) in link.directions() {
            let addr = cluster.node(listener)?.spec().p2p_addr();
            debug!(%link, dialer, %addr, "addnode");
            cluster
                .client(dialer)?
                .add_node(&addr)
                .await
                .map_err(|e| TopologyError {
                    link,
                    cause: ConvergeError::Rpc(e),
                })?;
        }

        info!(%link, "peer link requested");
        self.links.push(link);
        Ok(link)
    }

    /// Links node 0 to every other node, one direction each.
    pub async fn connect_star(&mut self, cluster: &ClusterSupervisor) -> Result<()> {
        for to in 1..cluster.len() {
            self.connect(cluster, 0, to, false).await?;
        }
        Ok(())
    }

    /// Waits until every recorded link shows up, handshaken, on the dialing
    /// node. Fails with the first link that does not.
    pub async fn wait_connected(&self, cluster: &ClusterSupervisor, settings: &WaitSettings) -> Result<()> {
        for &link in &self.links {
            for (dialer, listener) in link.directions() {
                let addr = cluster.node(listener)?.spec().p2p_addr();
                let client = cluster.client(dialer)?;
                await_peer_connected(client, &addr, settings)
                    .await
                    .map_err(|cause| TopologyError { link, cause })?;
            }
            debug!(%link, "peer link confirmed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClusterSpec;
    use chainharness_config::HarnessConfig;
    use tempfile::TempDir;

    #[test]
    fn test_link_directions() {
        let one_way = PeerLink {
            from: 0,
            to: 2,
            bidirectional: false,
        };
        assert_eq!(one_way.directions(), vec![(0, 2)]);
        assert_eq!(one_way.to_string(), "node0 -> node2");

        let both = PeerLink {
            bidirectional: true,
            ..one_way
        };
        assert_eq!(both.directions(), vec![(0, 2), (2, 0)]);
        assert_eq!(both.to_string(), "node0 <-> node2");
    }

    #[tokio::test]
    async fn test_self_link_rejected() {
        let temp = TempDir::new().unwrap();
        let spec = ClusterSpec::uniform(&HarnessConfig::default(), temp.path(), 2, &[]).unwrap();
        let cluster = ClusterSupervisor::new(spec).unwrap();

        let mut topology = Topology::new();
        let result = topology.connect(&cluster, 1, 1, true).await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(topology.links().is_empty());
    }

    #[tokio::test]
    async fn test_connect_to_stopped_node_names_link() {
        let temp = TempDir::new().unwrap();
        let mut config = HarnessConfig::default();
        // Nothing listens here
        config.ports.rpc_base = 1;
        config.ports.p2p_base = 3;
        config.rpc.request_timeout_ms = 500;
        let spec = ClusterSpec::uniform(&config, temp.path(), 2, &[]).unwrap();
        let cluster = ClusterSupervisor::new(spec).unwrap();

        let mut topology = Topology::new();
        let err = topology.connect(&cluster, 0, 1, true).await.unwrap_err();
        match err {
            Error::Topology(e) => {
                assert_eq!(e.link.to_string(), "node0 <-> node1");
                assert!(matches!(e.cause, ConvergeError::Rpc(_)));
            }
            other => panic!("expected topology error, got {other:?}"),
        }
    }
}
