//! bspctl - controller discovery and firmware rollout
//!
//! Binary entry point for the CLI application.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    bspctl::cli::run().await
}
