//! chainharness command line.
//!
//! Runs multi-node integration scenarios against a ledger node binary.
//!
//! # Quick Start
//!
//! ```bash
//! # List the built-in scenarios
//! chainharness list
//!
//! # Run one scenario, keeping node data for inspection
//! chainharness smsg --workdir ./runs --keep-data always
//!
//! # Run everything against a specific binary
//! chainharness all --binary ./target/debug/chainharness-devnode
//! ```

mod commands;
mod style;

use anyhow::Result;
use chainharness_config::KeepData;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

/// chainharness - multi-process integration scenarios for ledger nodes.
#[derive(Parser)]
#[command(name = "chainharness")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of the loaded configuration.
#[derive(Args, Clone)]
pub struct GlobalArgs {
    /// Root directory for node data and logs (default: a fresh temp dir).
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Node binary to launch.
    #[arg(long, global = true)]
    binary: Option<PathBuf>,

    /// When to keep node data after a run.
    #[arg(long, global = true, value_enum)]
    keep_data: Option<KeepDataArg>,

    /// Directory holding chainharness.toml (default: current directory).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Log at DEBUG level.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum KeepDataArg {
    Always,
    OnFailure,
    Never,
}

impl From<KeepDataArg> for KeepData {
    fn from(arg: KeepDataArg) -> Self {
        match arg {
            KeepDataArg::Always => KeepData::Always,
            KeepDataArg::OnFailure => KeepData::OnFailure,
            KeepDataArg::Never => KeepData::Never,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Secure messaging between two nodes.
    Smsg,

    /// Private-value sends across three nodes.
    Anon,

    /// Verbose transaction lookups with and without the transaction index.
    Txindex,

    /// Block hashes by timestamp range.
    Timestampindex,

    /// Run every scenario in sequence.
    All,

    /// List the built-in scenarios.
    List,

    /// Show the effective configuration.
    Config {
        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.global.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    if cli.global.no_color || std::env::var_os("NO_COLOR").is_some() {
        style::set_no_color(true);
    }

    match cli.command {
        Commands::Smsg => commands::run::one(&cli.global, "smsg").await,
        Commands::Anon => commands::run::one(&cli.global, "anon").await,
        Commands::Txindex => commands::run::one(&cli.global, "txindex").await,
        Commands::Timestampindex => commands::run::one(&cli.global, "timestampindex").await,
        Commands::All => commands::run::all(&cli.global).await,
        Commands::List => {
            commands::list::run();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { format } => {
            commands::config::show(&cli.global, &format)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
