//! Application configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::APP_NAME;

/// Service advertised by the controllers
pub const DEFAULT_SERVICE: &str = "_base-unit-deif._tcp.local.";

/// Upper bound on simultaneous device transfers
pub const MAX_CONCURRENCY_LIMIT: usize = 4096;
/// Bounds for progress and poll rates, per second
pub const MIN_RATE: f64 = 0.01;
pub const MAX_RATE: f64 = 100.0;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// mDNS discovery configuration
    pub discovery: DiscoveryConfig,
    /// Login and token refresh configuration
    pub session: SessionConfig,
    /// Firmware deployment configuration
    pub deploy: DeployConfig,
}

/// Discovery-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// PTR question asked on the network
    pub service: String,
    /// How long `--target-any` / `--target-all` browse before giving up
    pub timeout_secs: u64,
}

/// Session-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Default login user
    pub username: String,
    /// URL scheme of the maintenance API
    pub scheme: String,
    /// Skip certificate verification
    pub insecure: bool,
    /// Interval between background token refreshes
    pub refresh_interval_secs: u64,
    pub connect_timeout_secs: u64,
    /// Timeout of the login request itself
    pub login_timeout_secs: u64,
}

/// Deployment-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Maximum targets worked on at the same time, across both phases
    pub concurrency_limit: usize,
    /// Upload progress updates per second
    pub progress_rate: f64,
    /// Installation status polls per second
    pub poll_rate: f64,
    /// Abort an upload that wrote nothing for this long
    pub stall_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            timeout_secs: 1,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            scheme: "https".to_string(),
            insecure: false,
            refresh_interval_secs: 9 * 60,
            connect_timeout_secs: 30,
            login_timeout_secs: 30,
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 10,
            progress_rate: 3.0,
            poll_rate: 1.0,
            stall_timeout_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Default location: `<config dir>/bspctl/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location when it exists.
    /// Missing default file means built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_CONCURRENCY_LIMIT).contains(&self.deploy.concurrency_limit) {
            anyhow::bail!(
                "deploy.concurrency_limit must be between 1 and {}",
                MAX_CONCURRENCY_LIMIT
            );
        }
        let in_range = |rate: f64| (MIN_RATE..=MAX_RATE).contains(&rate);
        if !in_range(self.deploy.progress_rate) || !in_range(self.deploy.poll_rate) {
            anyhow::bail!(
                "deploy.progress_rate and deploy.poll_rate must be between {} and {} per second",
                MIN_RATE,
                MAX_RATE
            );
        }
        if self.session.scheme != "https" && self.session.scheme != "http" {
            anyhow::bail!("session.scheme must be http or https");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.discovery.service, DEFAULT_SERVICE);
        assert_eq!(config.session.refresh_interval(), Duration::from_secs(540));
        assert_eq!(config.deploy.concurrency_limit, 10);
        assert_eq!(config.deploy.poll_rate, 1.0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[deploy]\nconcurrency_limit = 3\n\n[session]\ninsecure = true").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.deploy.concurrency_limit, 3);
        assert_eq!(config.deploy.stall_timeout_secs, 60);
        assert!(config.session.insecure);
        assert_eq!(config.session.username, "admin");
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for content in [
            "[deploy]\nprogress_rate = 1e-20",
            "[deploy]\npoll_rate = 0.0",
            "[deploy]\npoll_rate = 1e9",
            "[deploy]\nconcurrency_limit = 1000000",
        ] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "{}", content).unwrap();
            assert!(AppConfig::load(Some(file.path())).is_err(), "{}", content);
        }
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[deploy]\nconcurrency_limit = 0").unwrap();

        assert!(AppConfig::load(Some(file.path())).is_err());
    }
}
