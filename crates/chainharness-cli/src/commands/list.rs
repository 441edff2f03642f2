//! `chainharness list`.

use crate::style;
use chainharness_scenario::scenarios;

pub fn run() {
    let rows: Vec<Vec<String>> = scenarios::all()
        .iter()
        .map(|s| {
            vec![
                s.name().to_string(),
                s.node_count().to_string(),
                s.description().to_string(),
            ]
        })
        .collect();
    style::print_table(&["Scenario", "Nodes", "Description"], &rows);
}
