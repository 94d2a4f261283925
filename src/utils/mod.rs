//! Utility functions and helpers used throughout bspctl

pub mod format;
pub mod logging;
