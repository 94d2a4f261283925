//! Wire models of the firmware endpoints

use serde::Deserialize;

/// Body of `GET /firmware/upgrade` while an installation is running
#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeState {
    #[serde(rename = "Lines", alias = "lines")]
    pub lines: Vec<UpgradeLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeLine {
    /// Percent, 0 to 100
    #[serde(rename = "Progress", alias = "progress")]
    pub progress: i64,
    #[serde(rename = "Text", alias = "text", default)]
    pub text: String,
}

impl UpgradeState {
    /// Ratio and status of the first line, if the device sent one
    pub fn current(&self) -> Option<(f64, &str)> {
        self.lines
            .first()
            .map(|line| (line.progress as f64 / 100.0, line.text.as_str()))
    }
}
