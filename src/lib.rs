//! bspctl - fleet management for base unit controllers
//!
//! bspctl finds controllers on the local network through mDNS, logs in to
//! their maintenance API and rolls new firmware out to many of them at
//! once: every image is uploaded first, and only then installed.

pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod remote;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use errors::*;
pub use models::*;

/// bspctl version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// bspctl application name
pub const APP_NAME: &str = "bspctl";
