//! Data models and types used throughout bspctl

pub mod firmware;
pub mod progress;
pub mod target;

pub use firmware::*;
pub use progress::*;
pub use target::*;
