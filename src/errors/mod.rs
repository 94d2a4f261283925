//! Error types shared by discovery, sessions and deployments

pub mod types;

pub use types::*;
