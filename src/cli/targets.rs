//! Turning target flags into logged-in endpoints

use anyhow::{Context, Result, bail};
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::args::{LoginArgs, TargetArgs};
use crate::config::AppConfig;
use crate::errors::BspError;
use crate::models::Endpoint;
use crate::remote::discovery::Browser;
use crate::remote::session::{AuthenticatedClient, Credentials};

/// Hostnames selected by `-t`, `--target-any` or `--target-all`
pub async fn select_targets(args: &TargetArgs, config: &AppConfig) -> Result<Vec<String>> {
    let selection = &args.selection;
    if !selection.target.is_empty() {
        return Ok(selection.target.clone());
    }

    let timeout = args
        .target_timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.discovery.timeout());
    let browser = Browser::for_service(&config.discovery.service)
        .with_context(|| format!("invalid service name {}", config.discovery.service))?;

    if selection.target_any {
        return first_target(&browser, timeout).await;
    }
    if selection.target_all {
        return all_targets(&browser, timeout).await;
    }

    bail!("no targets specified")
}

async fn first_target(browser: &Browser, timeout: Duration) -> Result<Vec<String>> {
    let cancel = CancellationToken::new();
    let _stop = cancel.clone().drop_guard();
    let mut updates = browser
        .run(cancel.clone())
        .await
        .context("unable to browse mdns")?;

    match tokio::time::timeout(timeout, updates.recv()).await {
        Ok(Some(snapshot)) => match snapshot.into_iter().next() {
            Some(target) => Ok(vec![target.hostname]),
            None => bail!("found no targets within deadline"),
        },
        _ => bail!("found no targets within deadline"),
    }
}

async fn all_targets(browser: &Browser, timeout: Duration) -> Result<Vec<String>> {
    let cancel = CancellationToken::new();
    let mut updates = browser
        .run(cancel.clone())
        .await
        .context("unable to browse mdns")?;

    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        stop.cancel();
    });

    // the last snapshot holds everything found
    let mut found = Vec::new();
    while let Some(snapshot) = updates.recv().await {
        found = snapshot;
    }

    if found.is_empty() {
        bail!("found no targets within deadline");
    }
    Ok(found.into_iter().map(|target| target.hostname).collect())
}

/// Asks for a replacement password after a device rejected one
pub trait PasswordPrompt {
    fn ask(&mut self, username: &str, host: &str) -> io::Result<String>;
}

/// Reads the password from the terminal without echoing it
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn ask(&mut self, username: &str, host: &str) -> io::Result<String> {
        rpassword::prompt_password(format!("Enter password for {}@{}: ", username, host))
    }
}

/// Log in to every host, one after the other.
///
/// With a `prompt`, a rejected password is asked for again until the host
/// accepts one; the accepted password is then tried on the remaining hosts.
pub async fn login_all(
    hosts: &[String],
    login: &LoginArgs,
    config: &AppConfig,
    mut prompt: Option<&mut dyn PasswordPrompt>,
) -> Result<Vec<Endpoint>> {
    let mut session = config.session.clone();
    session.insecure |= login.insecure;

    let username = login
        .username
        .clone()
        .unwrap_or_else(|| session.username.clone());
    let mut password = login.password.clone();

    let mut endpoints = Vec::with_capacity(hosts.len());
    for host in hosts {
        let client = loop {
            let credentials = Credentials::new(username.clone(), password.clone());
            match AuthenticatedClient::login_with(host, &credentials, &session).await {
                Err(BspError::InvalidCredentials) => {
                    let Some(prompt) = prompt.as_deref_mut() else {
                        return Err(BspError::InvalidCredentials)
                            .with_context(|| format!("unable to authenticate to {}", host));
                    };
                    log::warn!("{}: password rejected for {}", host, username);
                    password = prompt
                        .ask(&username, host)
                        .context("unable to ask for password")?;
                }
                result => {
                    break result.with_context(|| format!("unable to authenticate to {}", host))?;
                }
            }
        };
        log::info!("🔑 Logged in to {}", host);
        endpoints.push(Endpoint::new(host.clone(), client));
    }

    Ok(endpoints)
}
