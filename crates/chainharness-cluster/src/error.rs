//! Error types for cluster management.

use crate::topology::PeerLink;
use chainharness_converge::ConvergeError;
use chainharness_rpc::RpcError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a node did not reach the ready state.
#[derive(Error, Debug)]
pub enum StartupCause {
    /// Data directory or config file could not be prepared.
    #[error("preparing data directory: {0}")]
    Prepare(#[source] std::io::Error),

    /// The binary could not be launched at all.
    #[error("failed to spawn {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The process exited while the readiness probe was running.
    #[error("process exited during startup ({})", describe_exit(.code))]
    Exited { code: Option<i32> },

    /// The RPC server never answered, or answered with a non-transient error.
    #[error("readiness probe: {0}")]
    Probe(#[from] ConvergeError),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}

/// A node failed to become ready.
#[derive(Error, Debug)]
#[error("node{node} failed to start: {cause}")]
pub struct StartupError {
    pub node: usize,
    #[source]
    pub cause: StartupCause,
    /// Last lines of the node's log files at the time of failure.
    pub log_tail: Vec<String>,
}

/// A recorded peer link could not be established or confirmed.
#[derive(Error, Debug)]
#[error("peer link {link} not established: {cause}")]
pub struct TopologyError {
    pub link: PeerLink,
    #[source]
    pub cause: ConvergeError,
}

/// Cluster management errors.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No cluster manifest in the working directory.
    #[error("Cluster not initialized at {0}")]
    NotInitialized(PathBuf),

    /// Node already running.
    #[error("Node {0} is already running")]
    NodeAlreadyRunning(usize),

    /// Node not found.
    #[error("Node {0} not found")]
    NodeNotFound(usize),

    /// Node failed to start.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// Peer link failure.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Invalid node count.
    #[error("Invalid node count: {0} (must be >= 1)")]
    InvalidNodeCount(usize),

    /// Port range overflows or overlaps.
    #[error("Invalid port range: p2p base={p2p_base}, rpc base={rpc_base}, nodes={nodes}")]
    InvalidPortRange {
        p2p_base: u16,
        rpc_base: u16,
        nodes: usize,
    },

    /// RPC client construction failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;
