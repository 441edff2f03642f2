//! Scenario sequencing: cluster up, topology, steps, teardown.

use crate::context::ScenarioContext;
use crate::error::{Result, ScenarioError};
use crate::journal::Journal;
use crate::result::{Diagnostics, ScenarioResult};
use async_trait::async_trait;
use chainharness_cluster::{ClusterSpec, ClusterSupervisor, wait_settings};
use chainharness_config::{HarnessConfig, Paths};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// A multi-node test script.
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Short name, used as the CLI subcommand.
    fn name(&self) -> &'static str;

    /// One-line summary for listings.
    fn description(&self) -> &'static str;

    fn node_count(&self) -> usize;

    /// Per-node flags, one entry per node.
    fn node_args(&self) -> Vec<Vec<String>> {
        vec![Vec::new(); self.node_count()]
    }

    /// Requests peer links. The runner waits for them before [`Scenario::run`].
    async fn setup_network(&self, _ctx: &mut ScenarioContext) -> Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> Result<()>;
}

/// Runs scenarios against freshly started clusters.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    config: HarnessConfig,
}

/// Where a scenario's node data lives.
enum Workdir {
    Fixed(PathBuf),
    Temp(TempDir),
}

impl Workdir {
    fn path(&self) -> &Path {
        match self {
            Workdir::Fixed(path) => path.as_path(),
            Workdir::Temp(dir) => dir.path(),
        }
    }

    /// Keeps or removes the directory; returns the path when kept.
    fn finish(self, keep: bool) -> Option<PathBuf> {
        match (self, keep) {
            (Workdir::Temp(dir), true) => Some(dir.keep()),
            (Workdir::Fixed(path), true) => Some(path),
            (Workdir::Temp(dir), false) => {
                if let Err(e) = dir.close() {
                    warn!(error = %e, "failed to remove scenario directory");
                }
                None
            }
            (Workdir::Fixed(path), false) => {
                if let Err(e) = std::fs::remove_dir_all(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove scenario directory");
                }
                None
            }
        }
    }
}

impl ScenarioRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs one scenario. Never panics on scenario failure and always tears
    /// the cluster down; the outcome is in the returned result.
    pub async fn run(&self, scenario: &dyn Scenario) -> ScenarioResult {
        let name = scenario.name();
        let started = Instant::now();
        let journal = Journal::new();
        info!(scenario = name, nodes = scenario.node_count(), "scenario starting");

        let workdir = match self.prepare_workdir(name) {
            Ok(workdir) => workdir,
            Err(e) => {
                error!(scenario = name, error = %e, "cannot prepare working directory");
                return ScenarioResult::new(
                    name,
                    started.elapsed(),
                    journal.entries(),
                    Some(&e),
                    Diagnostics::default(),
                    None,
                );
            }
        };

        let (first_error, node_logs) = self.execute(scenario, workdir.path(), &journal).await;

        let passed = first_error.is_none();
        let diagnostics = if passed {
            Diagnostics::default()
        } else {
            Diagnostics {
                journal_tail: journal.tail(self.config.output.journal_tail),
                node_logs,
            }
        };
        let kept = workdir.finish(self.config.output.keep_data.keep(passed));

        let result = ScenarioResult::new(
            name,
            started.elapsed(),
            journal.entries(),
            first_error.as_ref(),
            diagnostics,
            kept,
        );
        match result.failure() {
            None => info!(scenario = name, elapsed = ?result.elapsed(), "scenario passed"),
            Some(failure) => error!(
                scenario = name,
                kind = failure.kind,
                error = %failure.message,
                "scenario failed"
            ),
        }
        result
    }

    /// Runs scenarios one after another.
    pub async fn run_all(&self, scenarios: &[Box<dyn Scenario>]) -> Vec<ScenarioResult> {
        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            results.push(self.run(scenario.as_ref()).await);
        }
        results
    }

    fn prepare_workdir(&self, name: &str) -> Result<Workdir> {
        match &self.config.output.workdir {
            Some(root) => {
                let dir = Paths::scenario_dir(root, name);
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)?;
                }
                std::fs::create_dir_all(&dir)?;
                Ok(Workdir::Fixed(dir))
            }
            None => Ok(Workdir::Temp(
                tempfile::Builder::new()
                    .prefix(&format!("chainharness-{name}-"))
                    .tempdir()?,
            )),
        }
    }

    /// Starts the cluster, runs the steps and tears down. Returns the first
    /// error and each node's log tail.
    async fn execute(
        &self,
        scenario: &dyn Scenario,
        workdir: &Path,
        journal: &Journal,
    ) -> (Option<ScenarioError>, Vec<(String, Vec<String>)>) {
        let lines = self.config.output.log_tail_lines;

        journal.step("start cluster");
        let spec = match ClusterSpec::new(&self.config, workdir, scenario.node_args()) {
            Ok(spec) => spec,
            Err(e) => return (Some(e.into()), Vec::new()),
        };
        let settings = wait_settings(&spec.timeouts);

        let mut cluster = match ClusterSupervisor::new(spec) {
            Ok(cluster) => cluster,
            Err(e) => return (Some(e.into()), Vec::new()),
        };
        if let Err(e) = cluster.start_all().await {
            // start_all has already stopped the nodes it launched
            let logs = collect_logs(&cluster, lines);
            return (Some(e.into()), logs);
        }

        let mut ctx = ScenarioContext::new(cluster, journal.clone(), settings);
        let outcome = run_steps(scenario, &mut ctx).await;

        let mut cluster = ctx.into_cluster();
        cluster.stop_all().await;

        let logs = if outcome.is_err() {
            collect_logs(&cluster, lines)
        } else {
            Vec::new()
        };
        (outcome.err(), logs)
    }
}

async fn run_steps(scenario: &dyn Scenario, ctx: &mut ScenarioContext) -> Result<()> {
    ctx.step("setup network");
    scenario.setup_network(ctx).await?;
    ctx.wait_connected().await?;

    ctx.step("run");
    scenario.run(ctx).await
}

fn collect_logs(cluster: &ClusterSupervisor, lines: usize) -> Vec<(String, Vec<String>)> {
    cluster
        .nodes()
        .iter()
        .map(|node| (node.spec().label(), node.log_tail(lines)))
        .collect()
}
