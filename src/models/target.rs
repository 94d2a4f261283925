//! Discovered targets and authenticated endpoints

use serde::{Deserialize, Serialize};

use crate::remote::session::AuthenticatedClient;

/// A device found through mDNS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Hostname as advertised, trailing root dot trimmed, case preserved
    pub hostname: String,
    /// UI selection state
    #[serde(default)]
    pub marked: bool,
}

impl Target {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            marked: false,
        }
    }

    /// Web interface of the device
    pub fn url(&self) -> String {
        format!("https://{}/", self.hostname)
    }
}

/// A hostname together with a client already logged in to it
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub hostname: String,
    pub client: AuthenticatedClient,
}

impl Endpoint {
    pub fn new(hostname: impl Into<String>, client: AuthenticatedClient) -> Self {
        Self {
            hostname: hostname.into(),
            client,
        }
    }
}
