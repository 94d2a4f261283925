//! Custom error types for bspctl

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::models::progress::Phase;

/// Main error type for bspctl operations
#[derive(Debug)]
pub enum BspError {
    /// Neither the IPv4 nor the IPv6 multicast listener could be bound
    Listen {
        ipv4: std::io::Error,
        ipv6: std::io::Error,
    },
    /// Query could not be sent on any interface, on either protocol
    Query { ipv4: String, ipv6: String },
    /// Malformed DNS message
    Dns(String),
    /// The device rejected the username/password (HTTP 403)
    InvalidCredentials,
    /// The device answered with a status code the operation does not accept
    UnexpectedStatus {
        operation: &'static str,
        status: reqwest::StatusCode,
    },
    /// A 200 response that should have carried a bearer token did not
    MissingAuthorization { operation: &'static str },
    /// Authenticated request failed in transit
    Transport {
        source: reqwest::Error,
        refresh_failure: Option<Arc<BspError>>,
    },
    /// Device answered 401 after the background refresh had already failed
    Unauthorized { refresh_failure: Option<Arc<BspError>> },
    /// Background token refresh failed; the refresh loop is gone for good
    Refresh(String),
    /// Device reports no firmware image to install (HTTP 404)
    NoFirmwareStaged,
    /// Device failed to install the staged image (HTTP 500)
    InstallFailed,
    /// Upload made no progress within the stall timeout
    Stalled { timeout: Duration },
    /// Operation was cancelled
    Cancelled,
    /// Target host could not be turned into a URL
    InvalidHost(String),
    /// Configuration errors
    Config(String),
    /// General I/O errors
    Io(std::io::Error),
    /// HTTP client errors outside an authenticated session
    Http(reqwest::Error),
    /// Serialization errors
    Serialization(String),
}

impl fmt::Display for BspError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BspError::Listen { ipv4, ipv6 } => write!(
                f,
                "unable to listen for mDNS on both ipv4 and ipv6: ipv4: {}, ipv6: {}",
                ipv4, ipv6
            ),
            BspError::Query { ipv4, ipv6 } => write!(
                f,
                "mDNS query failed on all interfaces for both ipv4 and ipv6\nipv4: {}\nipv6: {}",
                ipv4, ipv6
            ),
            BspError::Dns(msg) => write!(f, "malformed DNS message: {}", msg),
            BspError::InvalidCredentials => write!(f, "invalid credentials"),
            BspError::UnexpectedStatus { operation, status } => {
                write!(f, "{}: unexpected http status code: {}", operation, status)
            }
            BspError::MissingAuthorization { operation } => {
                write!(f, "{}: authorization header not found in response", operation)
            }
            BspError::Transport {
                source,
                refresh_failure,
            } => {
                write!(f, "http request failed: {}", source)?;
                if let Some(refresh) = refresh_failure {
                    write!(f, "\nbefore that: {}", refresh)?;
                }
                Ok(())
            }
            BspError::Unauthorized { refresh_failure } => {
                write!(f, "status 401 unauthorized")?;
                if let Some(refresh) = refresh_failure {
                    write!(f, ", prior to that: {}", refresh)?;
                }
                Ok(())
            }
            BspError::Refresh(msg) => write!(f, "refresh token: {}", msg),
            BspError::NoFirmwareStaged => write!(f, "device answers: no firmware staged"),
            BspError::InstallFailed => {
                write!(f, "failed to install image: internal server error")
            }
            BspError::Stalled { timeout } => {
                write!(f, "upload stalled for {}s, giving up", timeout.as_secs())
            }
            BspError::Cancelled => write!(f, "operation cancelled"),
            BspError::InvalidHost(msg) => write!(f, "invalid host: {}", msg),
            BspError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BspError::Io(err) => write!(f, "I/O error: {}", err),
            BspError::Http(err) => write!(f, "HTTP error: {}", err),
            BspError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for BspError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BspError::Listen { ipv4, .. } => Some(ipv4),
            BspError::Transport { source, .. } => Some(source),
            BspError::Unauthorized {
                refresh_failure: Some(refresh),
            } => Some(refresh.as_ref()),
            BspError::Io(err) => Some(err),
            BspError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BspError {
    fn from(err: std::io::Error) -> Self {
        BspError::Io(err)
    }
}

impl From<reqwest::Error> for BspError {
    fn from(err: reqwest::Error) -> Self {
        BspError::Http(err)
    }
}

impl From<serde_json::Error> for BspError {
    fn from(err: serde_json::Error) -> Self {
        BspError::Serialization(err.to_string())
    }
}

/// Result type alias for bspctl operations
pub type Result<T> = std::result::Result<T, BspError>;

/// One target's failure within a deployment phase
#[derive(Debug)]
pub struct TargetFailure {
    pub hostname: String,
    pub error: BspError,
}

/// All failures of one deployment phase, joined
#[derive(Debug)]
pub struct DeployError {
    pub phase: Phase,
    pub failures: Vec<TargetFailure>,
}

impl DeployError {
    /// Hostnames that failed, in target order
    pub fn failed_hosts(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.hostname.as_str()).collect()
    }
}

impl fmt::Display for DeployError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "firmware {} failed on {} target(s)",
            self.phase,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.hostname, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for DeployError {}
