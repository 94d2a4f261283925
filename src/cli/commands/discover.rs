//! Discover command implementation

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::remote::discovery::Browser;

pub async fn execute_discover_command(
    config: &AppConfig,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let browser = Browser::for_service(&config.discovery.service)
        .with_context(|| format!("invalid service name {}", config.discovery.service))?;
    let mut updates = browser
        .run(cancel.clone())
        .await
        .context("unable to browse mdns")?;

    let stop = cancel.clone();
    tokio::spawn(async move {
        match timeout {
            Some(secs) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        stop.cancel();
    });

    log::info!("🔍 Discovering {}", config.discovery.service);

    let mut known = HashSet::new();
    while let Some(snapshot) = updates.recv().await {
        if json {
            println!(
                "{}",
                serde_json::to_string(&snapshot).context("unable to marshal json")?
            );
            continue;
        }

        for target in snapshot {
            if known.insert(target.hostname.clone()) {
                println!("{}", target.hostname);
            }
        }
    }

    Ok(())
}
