//! Scenario execution and result reporting.

use super::load_config;
use crate::GlobalArgs;
use crate::style::{self, SemanticStyle};
use anyhow::{Context, Result};
use chainharness_scenario::{ScenarioResult, ScenarioRunner, scenarios};
use std::process::ExitCode;

/// Runs the scenario called `name`.
pub async fn one(global: &GlobalArgs, name: &str) -> Result<ExitCode> {
    let config = load_config(global)?;
    let scenario = scenarios::find(name).with_context(|| format!("Unknown scenario '{name}'"))?;

    let runner = ScenarioRunner::new(config);
    let result = runner.run(scenario.as_ref()).await;
    print_result(&result);

    Ok(exit_code(std::slice::from_ref(&result)))
}

/// Runs every built-in scenario in order; fails if any of them fails.
pub async fn all(global: &GlobalArgs) -> Result<ExitCode> {
    let config = load_config(global)?;
    let runner = ScenarioRunner::new(config);

    let results = runner.run_all(&scenarios::all()).await;
    for result in &results {
        print_result(result);
    }

    style::print_spacer();
    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|r| {
            vec![
                r.scenario().to_string(),
                if r.passed() { "passed" } else { "FAILED" }.to_string(),
                format!("{:.1}s", r.elapsed().as_secs_f64()),
            ]
        })
        .collect();
    style::print_table(&["Scenario", "Outcome", "Elapsed"], &rows);

    let failed = results.iter().filter(|r| !r.passed()).count();
    if failed == 0 {
        style::print_success(&format!("{} scenarios passed", results.len()));
    } else {
        style::print_error(&format!("{failed} of {} scenarios failed", results.len()));
    }
    Ok(exit_code(&results))
}

fn print_result(result: &ScenarioResult) {
    let elapsed = format!("{:.1}s", result.elapsed().as_secs_f64());
    if result.passed() {
        style::print_success(&format!("{} passed {}", result.scenario(), elapsed.muted()));
        return;
    }

    style::print_error(&format!("{} failed {}", result.scenario(), elapsed.muted()));
    eprint!("{}", result.report());
    if let Some(dir) = result.kept_workdir() {
        style::print_hint(&format!("inspect node logs under {}", dir.display()));
    }
}

fn exit_code(results: &[ScenarioResult]) -> ExitCode {
    if results.iter().all(ScenarioResult::passed) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
