//! Configuration management for chainharness
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (CHH_* prefix, `__` between nested keys)
//! 3. chainharness.local.toml (gitignored, local overrides)
//! 4. chainharness.toml (working directory)
//! 5. ~/.config/chainharness/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub node: NodeBinaryConfig,
    pub rpc: RpcConfig,
    pub ports: PortConfig,
    pub timeouts: TimeoutConfig,
    pub output: OutputConfig,
}

/// How to launch the node software under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeBinaryConfig {
    /// Path (or bare name resolved via PATH) of the node daemon.
    pub binary: PathBuf,
    /// Name of the config file written into every node data directory.
    pub conf_file: String,
    /// Chain selector passed as `-<chain>` (e.g. `regtest`).
    pub chain: String,
    /// Flags appended to every node's command line.
    pub extra_args: Vec<String>,
}

impl Default for NodeBinaryConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("chainharness-devnode"),
            conf_file: "chainharness.conf".to_string(),
            chain: "regtest".to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub request_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            user: "harness".to_string(),
            password: "harnesspass".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Port allocation. Node N listens on `base + N`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub p2p_base: u16,
    pub rpc_base: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            p2p_base: 11_000,
            rpc_base: 12_000,
        }
    }
}

/// Deadlines for every blocking step, in seconds unless noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub startup_secs: u64,
    pub shutdown_grace_secs: u64,
    pub poll_interval_ms: u64,
    pub connect_secs: u64,
    pub height_secs: u64,
    pub mempool_secs: u64,
    pub exchange_secs: u64,
    pub sync_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_secs: 60,
            shutdown_grace_secs: 10,
            poll_interval_ms: 500,
            connect_secs: 30,
            height_secs: 500,
            mempool_secs: 25,
            exchange_secs: 10,
            sync_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn height(&self) -> Duration {
        Duration::from_secs(self.height_secs)
    }

    pub fn mempool(&self) -> Duration {
        Duration::from_secs(self.mempool_secs)
    }

    pub fn exchange(&self) -> Duration {
        Duration::from_secs(self.exchange_secs)
    }

    pub fn sync(&self) -> Duration {
        Duration::from_secs(self.sync_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root for scenario working directories. A fresh temp dir is used when unset.
    pub workdir: Option<PathBuf>,
    pub keep_data: KeepData,
    /// Lines of each node log included in failure diagnostics.
    pub log_tail_lines: usize,
    /// Journal entries included in failure diagnostics.
    pub journal_tail: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            workdir: None,
            keep_data: KeepData::OnFailure,
            log_tail_lines: 40,
            journal_tail: 20,
        }
    }
}

/// Retention policy for node data directories after a scenario.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum KeepData {
    Always,
    OnFailure,
    Never,
}

impl KeepData {
    pub fn keep(self, passed: bool) -> bool {
        match self {
            KeepData::Always => true,
            KeepData::OnFailure => !passed,
            KeepData::Never => false,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific working directory
    pub fn load_from_dir(workdir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(workdir).load()
    }

    /// Resolve relative paths against `base_dir`.
    ///
    /// A bare binary name (no separator) is left alone so it can be found on PATH.
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if self.node.binary.components().count() > 1 && self.node.binary.is_relative() {
            self.node.binary = base.join(&self.node.binary);
        }

        if let Some(workdir) = &self.output.workdir {
            if workdir.is_relative() {
                self.output.workdir = Some(base.join(workdir));
            }
        }
    }

    /// Validates invariants the loader cannot express through serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.ports.p2p_base == self.ports.rpc_base {
            return Err(ConfigError::ValidationError(format!(
                "ports.p2p_base and ports.rpc_base must differ (both {})",
                self.ports.p2p_base
            )));
        }
        if self.node.conf_file.is_empty() {
            return Err(ConfigError::ValidationError(
                "node.conf_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}
