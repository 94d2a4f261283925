//! CLI command implementations

pub mod discover;
pub mod install;

use crate::cli::args::{Cli, Commands};
use crate::config::AppConfig;
use anyhow::Result;

/// Execute a CLI command
pub async fn execute_command(command: Commands, cli: &Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;

    match command {
        Commands::Discover { timeout, json } => {
            discover::execute_discover_command(&config, timeout, json).await
        }
        Commands::Install(args) => install::execute_install_command(&config, args).await,
    }
}
