//! Install command implementation

use anyhow::{Context, Result};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::args::InstallArgs;
use crate::cli::targets::{PasswordPrompt, TerminalPrompt, login_all, select_targets};
use crate::config::AppConfig;
use crate::models::{Phase, ProgressEvent, ProgressMessage};
use crate::services::{Deployer, FirmwareTarget, TransferOptions};

pub async fn execute_install_command(config: &AppConfig, args: InstallArgs) -> Result<()> {
    // fail on an unreadable image before touching the network
    std::fs::File::open(&args.file)
        .with_context(|| format!("unable to open {:?}", args.file))?;

    let hosts = select_targets(&args.targets, config)
        .await
        .context("could not get targets from flags")?;
    let mut terminal = TerminalPrompt;
    let prompt: Option<&mut dyn PasswordPrompt> = if args.login.prompts() {
        Some(&mut terminal)
    } else {
        None
    };
    let endpoints = login_all(&hosts, &args.login, config, prompt).await?;

    let mut targets = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        targets.push(
            FirmwareTarget::open(endpoint, &args.file)
                .await
                .context("unable to prepare firmware task")?,
        );
    }

    let concurrency_limit = args
        .concurrency_limit
        .unwrap_or(config.deploy.concurrency_limit);
    let deployer = Deployer::new(concurrency_limit, TransferOptions::from(&config.deploy));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling deployment");
            interrupt.cancel();
        }
    });

    println!(
        "📦 Installing {} on {} target(s)",
        args.file.display(),
        targets.len()
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(rx));

    let result = deployer.deploy(&cancel, &mut targets, &tx).await;
    drop(tx);
    renderer.await.context("progress renderer failed")?;

    result?;
    println!("✅ Firmware installed on {} target(s)", targets.len());
    Ok(())
}

/// Print one line per change of a target's status
async fn render_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    let mut last: HashMap<(String, Phase), ProgressMessage> = HashMap::new();

    while let Some(event) = rx.recv().await {
        let key = (event.target.clone(), event.phase);
        if last.get(&key) == Some(&event.message) {
            continue;
        }

        let message = &event.message;
        match &message.error {
            Some(error) => println!("❌ {} [{}] {}", event.target, event.phase, error),
            None if message.is_done() => {
                println!("✅ {} [{}] {}", event.target, event.phase, message.status)
            }
            None => println!(
                "   {} [{}] {:>3.0}% {}",
                event.target,
                event.phase,
                message.ratio * 100.0,
                message.status
            ),
        }

        last.insert(key, event.message);
    }
}
