//! Command Line Interface module
//!
//! This module contains the CLI argument parsing, target selection and
//! the command implementations.

pub mod args;
pub mod commands;
pub mod targets;

pub use args::*;

use anyhow::Result;

use crate::utils::logging::init_cli_logging;

/// Main CLI application runner
pub async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_cli_logging(cli.verbose, cli.quiet, cli.json_logs)?;

    commands::execute_command(cli.command.clone(), &cli).await
}
