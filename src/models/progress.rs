//! Progress messages published by deployment phases

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest ratio a still-running phase may report; 1.0 is reserved for completion
pub const MAX_RUNNING_RATIO: f64 = 0.99;

/// Deployment phase a progress message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Transfer the firmware image to the device
    Load,
    /// Activate the staged image
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Load => write!(f, "load"),
            Phase::Apply => write!(f, "apply"),
        }
    }
}

/// Latest known state of one target's phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    /// Completion in `[0, 1]`
    pub ratio: f64,
    pub status: String,
    pub error: Option<String>,
}

impl ProgressMessage {
    /// In-flight update. The ratio is clamped so it never reads as finished.
    pub fn running(ratio: f64, status: impl Into<String>) -> Self {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio };
        Self {
            ratio: ratio.clamp(0.0, MAX_RUNNING_RATIO),
            status: status.into(),
            error: None,
        }
    }

    /// Terminal success; the channel closes right after this message
    pub fn done(status: impl Into<String>) -> Self {
        Self {
            ratio: 1.0,
            status: status.into(),
            error: None,
        }
    }

    /// Terminal failure
    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            ratio: 0.0,
            status: String::new(),
            error: Some(format!("Failed: {}", error)),
        }
    }

    pub fn is_done(&self) -> bool {
        self.ratio >= 1.0 && self.error.is_none()
    }
}

/// Progress message tagged with the target and phase it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub target: String,
    pub phase: Phase,
    pub message: ProgressMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_never_reports_completion() {
        assert_eq!(ProgressMessage::running(1.0, "x").ratio, MAX_RUNNING_RATIO);
        assert_eq!(ProgressMessage::running(-0.5, "x").ratio, 0.0);
        assert_eq!(ProgressMessage::running(f64::NAN, "x").ratio, 0.0);
        assert!(!ProgressMessage::running(2.0, "x").is_done());
        assert!(ProgressMessage::done("ok").is_done());
    }

    #[test]
    fn test_failed_carries_error() {
        let msg = ProgressMessage::failed("boom");
        assert_eq!(msg.error.as_deref(), Some("Failed: boom"));
        assert!(!msg.is_done());
    }
}
