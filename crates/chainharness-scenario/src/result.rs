//! Scenario outcome and failure diagnostics.

use crate::error::ScenarioError;
use crate::journal::JournalEntry;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
}

/// The first error that ended a scenario, rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Category, e.g. `timeout` or `assertion`.
    pub kind: &'static str,
    /// Step that was running when the scenario failed.
    pub step: Option<String>,
    pub message: String,
    pub last_observed: Option<String>,
}

/// Context captured when a scenario fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Most recent journal entries, rendered.
    pub journal_tail: Vec<String>,
    /// Log tail per node label.
    pub node_logs: Vec<(String, Vec<String>)>,
}

/// Outcome of one scenario run. Built once by the runner.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    scenario: String,
    outcome: Outcome,
    elapsed: Duration,
    journal: Vec<JournalEntry>,
    failure: Option<Failure>,
    diagnostics: Diagnostics,
    kept_workdir: Option<PathBuf>,
}

impl ScenarioResult {
    pub(crate) fn new(
        scenario: &str,
        elapsed: Duration,
        journal: Vec<JournalEntry>,
        error: Option<&ScenarioError>,
        diagnostics: Diagnostics,
        kept_workdir: Option<PathBuf>,
    ) -> Self {
        let failure = error.map(|e| Failure {
            kind: e.kind(),
            step: last_step(&journal),
            message: e.to_string(),
            last_observed: e.last_observed(),
        });
        Self {
            scenario: scenario.to_string(),
            outcome: if failure.is_some() {
                Outcome::Failed
            } else {
                Outcome::Passed
            },
            elapsed,
            journal,
            failure,
            diagnostics,
            kept_workdir,
        }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Every call, wait and check, in order.
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Working directory left on disk, if the retention policy kept it.
    pub fn kept_workdir(&self) -> Option<&PathBuf> {
        self.kept_workdir.as_ref()
    }

    /// Multi-line failure report; empty for a passing run.
    pub fn report(&self) -> String {
        let Some(failure) = &self.failure else {
            return String::new();
        };

        let mut out = String::new();
        let _ = writeln!(out, "scenario {} failed ({})", self.scenario, failure.kind);
        if let Some(step) = &failure.step {
            let _ = writeln!(out, "  step: {step}");
        }
        let _ = writeln!(out, "  error: {}", failure.message);
        if let Some(observed) = &failure.last_observed {
            let _ = writeln!(out, "  last observed: {observed}");
        }

        if !self.diagnostics.journal_tail.is_empty() {
            let _ = writeln!(out, "  recent activity:");
            for line in &self.diagnostics.journal_tail {
                let _ = writeln!(out, "    {line}");
            }
        }
        for (node, lines) in &self.diagnostics.node_logs {
            if lines.is_empty() {
                continue;
            }
            let _ = writeln!(out, "  {node} log tail:");
            for line in lines {
                let _ = writeln!(out, "    {line}");
            }
        }
        if let Some(dir) = &self.kept_workdir {
            let _ = writeln!(out, "  data kept in {}", dir.display());
        }
        out
    }
}

fn last_step(journal: &[JournalEntry]) -> Option<String> {
    journal.iter().rev().find_map(|entry| match entry {
        JournalEntry::Step(name) => Some(name.clone()),
        _ => None,
    })
}
