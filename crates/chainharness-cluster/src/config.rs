//! Cluster layout: which nodes to launch, where, and on which ports.

use crate::{Error, Result};
use chainharness_config::{HarnessConfig, TimeoutConfig};
use chainharness_converge::WaitSettings;
use chainharness_rpc::RpcEndpoint;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the manifest written into the working directory.
pub const MANIFEST_FILE: &str = "cluster.toml";

/// Layout of a test cluster.
///
/// Node indices are dense `0..N`. A `ClusterSpec` is fixed once the cluster starts;
/// only [`crate::ClusterSupervisor::restart_node`] may swap a node's flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Root for node data directories, logs and the manifest.
    pub workdir: PathBuf,

    /// Per-request RPC timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Log lines attached to startup failures.
    pub log_tail_lines: usize,

    /// Deadlines for startup, shutdown and polling.
    pub timeouts: TimeoutConfig,

    /// Nodes in index order.
    pub nodes: Vec<NodeSpec>,
}

/// Launch parameters for a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node index (0-based, dense).
    pub index: usize,

    /// Node daemon to launch.
    pub binary: PathBuf,

    /// Chain selector, passed as `-<chain>`.
    pub chain: String,

    /// Config file name inside `data_dir`.
    pub conf_file: String,

    /// Data directory for this node.
    pub data_dir: PathBuf,

    /// Peer-to-peer listen port.
    pub p2p_port: u16,

    /// Extra command-line flags.
    pub args: Vec<String>,

    /// RPC server location and credentials.
    pub rpc: RpcEndpoint,
}

impl ClusterSpec {
    /// Builds a spec with one node per entry of `node_args`.
    ///
    /// Each node gets `config.node.extra_args` followed by its own flags.
    pub fn new(config: &HarnessConfig, workdir: impl Into<PathBuf>, node_args: Vec<Vec<String>>) -> Result<Self> {
        let workdir = workdir.into();
        let count = node_args.len();
        if count == 0 {
            return Err(Error::InvalidNodeCount(0));
        }
        check_ports(config.ports.p2p_base, config.ports.rpc_base, count)?;

        let nodes = node_args
            .into_iter()
            .enumerate()
            .map(|(index, own_args)| {
                let mut args = config.node.extra_args.clone();
                args.extend(own_args);
                NodeSpec {
                    index,
                    binary: config.node.binary.clone(),
                    chain: config.node.chain.clone(),
                    conf_file: config.node.conf_file.clone(),
                    data_dir: workdir.join(format!("node{index}")),
                    p2p_port: config.ports.p2p_base + index as u16,
                    args,
                    rpc: RpcEndpoint {
                        host: config.rpc.host.clone(),
                        port: config.ports.rpc_base + index as u16,
                        user: config.rpc.user.clone(),
                        password: config.rpc.password.clone(),
                    },
                }
            })
            .collect();

        Ok(Self {
            workdir,
            request_timeout_ms: config.rpc.request_timeout_ms,
            log_tail_lines: config.output.log_tail_lines,
            timeouts: config.timeouts.clone(),
            nodes,
        })
    }

    /// Builds a spec of `count` nodes sharing the same flags.
    pub fn uniform(config: &HarnessConfig, workdir: impl Into<PathBuf>, count: usize, args: &[String]) -> Result<Self> {
        Self::new(config, workdir, vec![args.to_vec(); count])
    }

    /// Loads the manifest from `workdir`.
    pub fn load(workdir: &Path) -> Result<Self> {
        let manifest = workdir.join(MANIFEST_FILE);

        if !manifest.exists() {
            return Err(Error::NotInitialized(workdir.to_path_buf()));
        }

        let content = fs::read_to_string(&manifest)?;
        let spec: Self = toml::from_str(&content)?;

        Ok(spec)
    }

    /// Writes the manifest into the working directory.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.workdir)?;
        let content = toml::to_string_pretty(self)?;
        fs::write(self.manifest_path(), content)?;
        Ok(())
    }

    /// Creates the data directory of every node.
    pub fn create_directories(&self) -> Result<()> {
        for node in &self.nodes {
            fs::create_dir_all(&node.data_dir)?;
        }
        Ok(())
    }

    pub fn node(&self, index: usize) -> Option<&NodeSpec> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.workdir.join(MANIFEST_FILE)
    }

    /// Convergence settings derived from the configured timeouts.
    pub fn wait_settings(&self) -> WaitSettings {
        wait_settings(&self.timeouts)
    }
}

/// Maps configured timeouts onto the named waits.
pub fn wait_settings(timeouts: &TimeoutConfig) -> WaitSettings {
    WaitSettings {
        interval: timeouts.poll_interval(),
        height_timeout: timeouts.height(),
        mempool_timeout: timeouts.mempool(),
        count_timeout: timeouts.exchange(),
        sync_timeout: timeouts.sync(),
        connect_timeout: timeouts.connect(),
        ..WaitSettings::default()
    }
}

fn check_ports(p2p_base: u16, rpc_base: u16, nodes: usize) -> Result<()> {
    let invalid = || Error::InvalidPortRange {
        p2p_base,
        rpc_base,
        nodes,
    };
    let span = u16::try_from(nodes - 1).map_err(|_| invalid())?;
    let p2p_last = p2p_base.checked_add(span).ok_or_else(invalid)?;
    let rpc_last = rpc_base.checked_add(span).ok_or_else(invalid)?;

    let overlap = p2p_base <= rpc_last && rpc_base <= p2p_last;
    if overlap {
        return Err(invalid());
    }
    Ok(())
}

impl NodeSpec {
    /// Name used in logs, errors and the journal.
    pub fn label(&self) -> String {
        format!("node{}", self.index)
    }

    /// Address other nodes dial to reach this one.
    pub fn p2p_addr(&self) -> String {
        format!("{}:{}", self.rpc.host, self.p2p_port)
    }

    pub fn conf_path(&self) -> PathBuf {
        self.data_dir.join(&self.conf_file)
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.data_dir.join("stdout.log")
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.data_dir.join("stderr.log")
    }

    /// Contents of the per-node config file.
    pub fn conf_contents(&self) -> String {
        format!(
            "{chain}=1\nserver=1\nport={port}\nrpcport={rpcport}\nrpcuser={user}\nrpcpassword={password}\nlisten=1\nlistenonion=0\n",
            chain = self.chain,
            port = self.p2p_port,
            rpcport = self.rpc.port,
            user = self.rpc.user,
            password = self.rpc.password,
        )
    }

    /// Creates the data directory and writes the config file.
    pub fn write_conf(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::write(self.conf_path(), self.conf_contents())
    }

    /// Command line after the binary name.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("-datadir={}", self.data_dir.display()),
            format!("-conf={}", self.conf_file),
            format!("-{}", self.chain),
        ];
        args.extend(self.args.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn flags(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_cluster_spec_creation() {
        let temp = TempDir::new().unwrap();
        let config = HarnessConfig::default();
        let spec = ClusterSpec::uniform(&config, temp.path(), 3, &flags(&["-debug"])).unwrap();

        assert_eq!(spec.len(), 3);

        let node0 = spec.node(0).unwrap();
        assert_eq!(node0.index, 0);
        assert_eq!(node0.p2p_port, 11_000);
        assert_eq!(node0.rpc.port, 12_000);
        assert_eq!(node0.data_dir, temp.path().join("node0"));

        let node2 = spec.node(2).unwrap();
        assert_eq!(node2.p2p_port, 11_002);
        assert_eq!(node2.rpc.port, 12_002);
        assert_eq!(node2.p2p_addr(), "127.0.0.1:11002");

        assert!(spec.node(3).is_none());
    }

    #[test]
    fn test_per_node_args_follow_shared_args() {
        let temp = TempDir::new().unwrap();
        let mut config = HarnessConfig::default();
        config.node.extra_args = flags(&["-printtoconsole=0"]);

        let spec = ClusterSpec::new(
            &config,
            temp.path(),
            vec![flags(&["-debug"]), flags(&["-debug", "-txindex"])],
        )
        .unwrap();

        assert_eq!(spec.nodes[0].args, flags(&["-printtoconsole=0", "-debug"]));
        assert_eq!(
            spec.nodes[1].args,
            flags(&["-printtoconsole=0", "-debug", "-txindex"])
        );
    }

    #[test]
    fn test_command_line() {
        let temp = TempDir::new().unwrap();
        let spec = ClusterSpec::uniform(&HarnessConfig::default(), temp.path(), 1, &flags(&["-txindex"])).unwrap();
        let args = spec.nodes[0].command_args();

        assert_eq!(args[0], format!("-datadir={}", temp.path().join("node0").display()));
        assert_eq!(args[1], "-conf=chainharness.conf");
        assert_eq!(args[2], "-regtest");
        assert_eq!(args[3], "-txindex");
    }

    #[test]
    fn test_conf_file_contents() {
        let temp = TempDir::new().unwrap();
        let spec = ClusterSpec::uniform(&HarnessConfig::default(), temp.path(), 2, &[]).unwrap();
        let node = &spec.nodes[1];
        node.write_conf().unwrap();

        let written = fs::read_to_string(node.conf_path()).unwrap();
        assert!(written.starts_with("regtest=1\n"));
        assert!(written.contains("port=11001\n"));
        assert!(written.contains("rpcport=12001\n"));
        assert!(written.contains("rpcuser=harness\n"));
        assert!(written.contains("listenonion=0\n"));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let spec = ClusterSpec::uniform(&HarnessConfig::default(), temp.path(), 3, &flags(&["-debug"])).unwrap();

        spec.save().unwrap();
        assert!(temp.path().join(MANIFEST_FILE).exists());

        let loaded = ClusterSpec::load(temp.path()).unwrap();
        assert_eq!(loaded.nodes, spec.nodes);
        assert_eq!(loaded.request_timeout_ms, spec.request_timeout_ms);
    }

    #[test]
    fn test_load_missing_manifest() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            ClusterSpec::load(temp.path()),
            Err(Error::NotInitialized(_))
        ));
    }

    #[test]
    fn test_create_directories() {
        let temp = TempDir::new().unwrap();
        let spec = ClusterSpec::uniform(&HarnessConfig::default(), temp.path(), 3, &[]).unwrap();

        spec.create_directories().unwrap();

        for i in 0..3 {
            assert!(temp.path().join(format!("node{i}")).exists());
        }
    }

    #[test]
    fn test_zero_nodes_rejected() {
        let result = ClusterSpec::new(&HarnessConfig::default(), "/tmp/unused", Vec::new());
        assert!(matches!(result, Err(Error::InvalidNodeCount(0))));
    }

    #[test]
    fn test_overlapping_port_ranges_rejected() {
        let mut config = HarnessConfig::default();
        config.ports.p2p_base = 12_000;
        config.ports.rpc_base = 12_002;

        let result = ClusterSpec::uniform(&config, "/tmp/unused", 3, &[]);
        assert!(matches!(result, Err(Error::InvalidPortRange { nodes: 3, .. })));

        assert!(ClusterSpec::uniform(&config, "/tmp/unused", 2, &[]).is_ok());
    }

    #[test]
    fn test_port_overflow_rejected() {
        let mut config = HarnessConfig::default();
        config.ports.p2p_base = u16::MAX - 1;

        let result = ClusterSpec::uniform(&config, "/tmp/unused", 3, &[]);
        assert!(matches!(result, Err(Error::InvalidPortRange { .. })));
    }

    #[test]
    fn test_wait_settings_follow_timeouts() {
        let mut timeouts = TimeoutConfig::default();
        timeouts.poll_interval_ms = 50;
        timeouts.exchange_secs = 7;

        let settings = wait_settings(&timeouts);
        assert_eq!(settings.interval.as_millis(), 50);
        assert_eq!(settings.count_timeout.as_secs(), 7);
        assert_eq!(settings.min_mempool_size, 100);
    }
}
