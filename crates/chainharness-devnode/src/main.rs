//! `chainharness-devnode` binary.

use anyhow::{Context, Result};
use chainharness_devnode::NodeArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = NodeArgs::parse(std::env::args().skip(1)).context("invalid arguments")?;

    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    for flag in &args.ignored {
        tracing::warn!(%flag, "ignoring unsupported argument");
    }

    chainharness_devnode::run(args).await?;
    Ok(())
}
