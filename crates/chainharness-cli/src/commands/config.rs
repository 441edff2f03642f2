//! Configuration display.

use super::load_config;
use crate::GlobalArgs;
use anyhow::{Context, Result};

/// Prints the effective configuration after all layers and overrides.
pub fn show(global: &GlobalArgs, format: &str) -> Result<()> {
    let config = load_config(global)?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        "toml" => {
            let toml_str = config.to_toml_string().context("Failed to render configuration")?;
            println!("{toml_str}");
        }
        other => anyhow::bail!("Unknown format '{other}' (expected toml or json)"),
    }
    Ok(())
}
