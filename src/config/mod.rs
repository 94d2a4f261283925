//! Configuration management for bspctl

pub mod app_config;

pub use app_config::*;
