//! Streamsim CLI - Command-line interface
//!
//! Runs adaptive streaming simulations and writes the per-client record files.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use streamsim_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "streamsim")]
#[command(about = "Adaptive video streaming client simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level, overridden by RUST_LOG
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    /// Directory receiving the full trace of the run
    #[arg(long, default_value = "target/streamsim-traces")]
    trace_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), &cli.trace_dir)?;

    commands::handle_command(cli.command)
}
