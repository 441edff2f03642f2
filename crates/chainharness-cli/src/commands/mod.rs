//! CLI command implementations.

pub mod config;
pub mod list;
pub mod run;

use crate::GlobalArgs;
use anyhow::{Context, Result};
use chainharness_config::HarnessConfig;
use std::path::PathBuf;

/// Loads the layered configuration and applies command-line overrides.
pub fn load_config(global: &GlobalArgs) -> Result<HarnessConfig> {
    let base = match &global.config_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };

    let mut config = HarnessConfig::load_from_dir(&base).context("Failed to load configuration")?;
    config.resolve_paths(&base);

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if let Some(binary) = &global.binary {
        config.node.binary = absolutize(&cwd, binary);
    }
    if let Some(workdir) = &global.workdir {
        config.output.workdir = Some(absolutize(&cwd, workdir));
    }
    if let Some(keep) = global.keep_data {
        config.output.keep_data = keep.into();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Joins relative paths with separators onto `cwd`; bare names stay for PATH lookup.
fn absolutize(cwd: &std::path::Path, path: &std::path::Path) -> PathBuf {
    if path.is_relative() && path.components().count() > 1 {
        cwd.join(path)
    } else {
        path.to_path_buf()
    }
}
