//! Node process management.

use crate::error::{StartupCause, StartupError};
use crate::{Error, NodeSpec, Result};
use chainharness_config::TimeoutConfig;
use chainharness_converge::{ConvergeError, ConvergenceQuery, Observation, await_condition};
use chainharness_rpc::RpcClient;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Status of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Node is stopped.
    Stopped,

    /// Process launched, RPC not answering yet.
    Starting,

    /// RPC server answers.
    Ready,

    /// Process exited without being asked to.
    Crashed,
}

/// A managed node process. Owned by exactly one [`crate::ClusterSupervisor`].
pub struct NodeProcess {
    spec: NodeSpec,
    client: RpcClient,
    process: Option<Child>,
    status: NodeStatus,
    restart_count: usize,
}

impl NodeProcess {
    /// Creates a node handle (not started).
    pub fn new(spec: NodeSpec, request_timeout: Duration) -> Result<Self> {
        let client = RpcClient::new(spec.label(), spec.rpc.clone(), request_timeout)?;
        Ok(Self {
            spec,
            client,
            process: None,
            status: NodeStatus::Stopped,
            restart_count: 0,
        })
    }

    /// Launches the process and waits until its RPC server answers.
    ///
    /// On failure the process is killed and the node is left `Crashed`.
    pub async fn start(&mut self, timeouts: &TimeoutConfig, log_tail_lines: usize) -> Result<()> {
        if matches!(self.status, NodeStatus::Starting | NodeStatus::Ready) {
            return Err(Error::NodeAlreadyRunning(self.spec.index));
        }

        self.status = NodeStatus::Starting;
        match self.launch(timeouts).await {
            Ok(()) => {
                self.status = NodeStatus::Ready;
                info!(
                    node = self.spec.index,
                    rpc_port = self.spec.rpc.port,
                    p2p_port = self.spec.p2p_port,
                    "node ready"
                );
                Ok(())
            }
            Err(cause) => {
                if let Some(mut child) = self.process.take() {
                    if let Err(e) = child.kill().await {
                        debug!(node = self.spec.index, error = %e, "kill after failed start");
                    }
                }
                self.status = NodeStatus::Crashed;
                Err(StartupError {
                    node: self.spec.index,
                    cause,
                    log_tail: self.log_tail(log_tail_lines),
                }
                .into())
            }
        }
    }

    async fn launch(&mut self, timeouts: &TimeoutConfig) -> std::result::Result<(), StartupCause> {
        self.spec.write_conf().map_err(StartupCause::Prepare)?;
        let stdout = open_log(&self.spec.stdout_log()).map_err(StartupCause::Prepare)?;
        let stderr = open_log(&self.spec.stderr_log()).map_err(StartupCause::Prepare)?;

        debug!(
            node = self.spec.index,
            binary = %self.spec.binary.display(),
            args = ?self.spec.command_args(),
            "spawning node"
        );

        let child = Command::new(&self.spec.binary)
            .args(self.spec.command_args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StartupCause::Spawn {
                binary: self.spec.binary.clone(),
                source,
            })?;
        let child = self.process.insert(child);

        let query = ConvergenceQuery::new("RPC server accepting calls", timeouts.startup())
            .on(self.spec.label())
            .every(timeouts.poll_interval());
        let client = &self.client;

        tokio::select! {
            ready = await_condition(&query, || async move {
                client.get_network_info().await?;
                Ok::<_, ConvergeError>(Observation::Ready(()))
            }) => ready.map_err(StartupCause::from),
            exited = child.wait() => Err(StartupCause::Exited {
                code: exited.ok().and_then(|status| status.code()),
            }),
        }
    }

    /// Stops the node: RPC `stop`, a bounded grace period, then a kill.
    ///
    /// Shutdown problems are logged, never returned as errors; the only
    /// error is a failed kill of a process that outlived its grace period.
    pub async fn stop(&mut self, grace: Duration) -> Result<()> {
        let Some(mut child) = self.process.take() else {
            self.status = NodeStatus::Stopped;
            return Ok(());
        };
        let index = self.spec.index;

        if matches!(child.try_wait(), Ok(None)) {
            match timeout(grace, self.client.stop()).await {
                Ok(Ok(())) => debug!(node = index, "stop requested"),
                Ok(Err(e)) => warn!(node = index, error = %e, "stop RPC failed"),
                Err(_) => warn!(node = index, "stop RPC timed out"),
            }

            match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => info!(node = index, %status, "node stopped"),
                Ok(Err(e)) => warn!(node = index, error = %e, "waiting for node exit failed"),
                Err(_) => {
                    warn!(node = index, ?grace, "node did not exit in time, killing");
                    self.status = NodeStatus::Stopped;
                    child.kill().await?;
                    return Ok(());
                }
            }
        }

        self.status = NodeStatus::Stopped;
        Ok(())
    }

    /// Stops the node and starts it again with `args`, keeping its index
    /// and data directory.
    pub async fn restart(
        &mut self,
        args: Vec<String>,
        timeouts: &TimeoutConfig,
        log_tail_lines: usize,
    ) -> Result<()> {
        self.stop(timeouts.shutdown_grace()).await?;
        self.spec.args = args;
        self.restart_count += 1;
        self.start(timeouts, log_tail_lines).await
    }

    /// Checks if the node process is alive, marking it `Crashed` if it exited.
    pub fn is_alive(&mut self) -> bool {
        let alive = match &mut self.process {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        if !alive && self.status == NodeStatus::Ready {
            self.status = NodeStatus::Crashed;
        }
        alive
    }

    /// OS process id while the process is running.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(Child::id)
    }

    /// Last `lines` lines of stderr then stdout, each prefixed with its file name.
    pub fn log_tail(&self, lines: usize) -> Vec<String> {
        let mut tail = Vec::new();
        for path in [self.spec.stderr_log(), self.spec.stdout_log()] {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            for line in tail_lines(&path, lines) {
                tail.push(format!("{name} | {line}"));
            }
        }
        tail
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn index(&self) -> usize {
        self.spec.index
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    /// RPC client for this node, without an observer attached.
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn restart_count(&self) -> usize {
        self.restart_count
    }
}

fn open_log(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn tail_lines(path: &Path, lines: usize) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let all: Vec<&str> = content.lines().collect();
    let skip = all.len().saturating_sub(lines);
    all[skip..].iter().map(|l| (*l).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClusterSpec;
    use chainharness_config::HarnessConfig;
    use tempfile::TempDir;

    fn test_node(temp: &TempDir, binary: &str, args: &[&str]) -> NodeProcess {
        let mut config = HarnessConfig::default();
        config.node.binary = binary.into();
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        let spec = ClusterSpec::uniform(&config, temp.path(), 1, &args).unwrap();
        NodeProcess::new(spec.nodes[0].clone(), Duration::from_secs(1)).unwrap()
    }

    fn fast_timeouts() -> TimeoutConfig {
        TimeoutConfig {
            startup_secs: 2,
            shutdown_grace_secs: 1,
            poll_interval_ms: 50,
            ..TimeoutConfig::default()
        }
    }

    #[test]
    fn test_node_process_creation() {
        let temp = TempDir::new().unwrap();
        let node = test_node(&temp, "chainharness-devnode", &[]);

        assert_eq!(node.status(), NodeStatus::Stopped);
        assert_eq!(node.index(), 0);
        assert_eq!(node.client().label(), "node0");
        assert!(node.pid().is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let temp = TempDir::new().unwrap();
        let mut node = test_node(&temp, "/nonexistent/chainharness-node", &[]);

        let err = node.start(&fast_timeouts(), 10).await.unwrap_err();
        match err {
            Error::Startup(StartupError {
                node: 0,
                cause: StartupCause::Spawn { .. },
                ..
            }) => {}
            other => panic!("expected spawn failure, got {other:?}"),
        }
        assert_eq!(node.status(), NodeStatus::Crashed);
        // Config file is written before the launch attempt
        assert!(temp.path().join("node0").join("chainharness.conf").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_early_exit_is_reported_with_exit_code() {
        let temp = TempDir::new().unwrap();
        // `false` ignores its arguments and exits 1
        let mut node = test_node(&temp, "false", &[]);

        let err = node.start(&fast_timeouts(), 10).await.unwrap_err();
        match err {
            Error::Startup(StartupError {
                cause: StartupCause::Exited { code },
                ..
            }) => assert_eq!(code, Some(1)),
            other => panic!("expected early exit, got {other:?}"),
        }
        assert!(!node.is_alive());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unresponsive_process_times_out_and_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let script = temp.path().join("silent-node.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut node = test_node(&temp, script.to_str().unwrap(), &[]);
        let err = node.start(&fast_timeouts(), 10).await.unwrap_err();

        match err {
            Error::Startup(StartupError {
                cause: StartupCause::Probe(ConvergeError::Timeout(timeout)),
                ..
            }) => {
                assert_eq!(timeout.node, "node0");
                assert!(timeout.last_observed.contains("unavailable"));
            }
            other => panic!("expected readiness timeout, got {other:?}"),
        }
        assert_eq!(node.status(), NodeStatus::Crashed);
        assert!(node.pid().is_none());
    }

    #[tokio::test]
    async fn test_stop_when_never_started_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut node = test_node(&temp, "chainharness-devnode", &[]);

        node.stop(Duration::from_millis(100)).await.unwrap();
        node.stop(Duration::from_millis(100)).await.unwrap();
        assert_eq!(node.status(), NodeStatus::Stopped);
    }

    #[test]
    fn test_log_tail_takes_last_lines() {
        let temp = TempDir::new().unwrap();
        let node = test_node(&temp, "chainharness-devnode", &[]);
        std::fs::create_dir_all(&node.spec().data_dir).unwrap();
        std::fs::write(node.spec().stderr_log(), "e1\ne2\ne3\n").unwrap();
        std::fs::write(node.spec().stdout_log(), "o1\n").unwrap();

        let tail = node.log_tail(2);
        assert_eq!(tail, vec!["stderr.log | e2", "stderr.log | e3", "stdout.log | o1"]);
    }
}
