//! One device's firmware transfer: upload the image, then install it

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, StatusCode};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;

use super::progress::ProgressSender;
use super::upload::{UploadMeter, metered_stream, report_upload};
use crate::config::DeployConfig;
use crate::errors::{BspError, Result};
use crate::models::{Endpoint, UpgradeState};

pub const FIRMWARE_FILE_PATH: &str = "/firmware/file";
pub const FIRMWARE_UPGRADE_PATH: &str = "/firmware/upgrade";

const FIRMWARE_FIELD: &str = "file";
const FIRMWARE_MIME: &str = "application/octet-stream";

/// Pacing of a transfer
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Upload progress updates per second
    pub progress_rate: f64,
    /// Installation status polls per second
    pub poll_rate: f64,
    pub stall_timeout: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from(&DeployConfig::default())
    }
}

impl From<&DeployConfig> for TransferOptions {
    fn from(config: &DeployConfig) -> Self {
        Self {
            progress_rate: config.progress_rate,
            poll_rate: config.poll_rate,
            stall_timeout: Duration::from_secs(config.stall_timeout_secs),
        }
    }
}

impl TransferOptions {
    fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.poll_rate).unwrap_or(Duration::from_secs(1))
    }
}

/// A firmware image bound for one authenticated device
#[derive(Debug)]
pub struct FirmwareTarget {
    endpoint: Endpoint,
    path: PathBuf,
    base_name: String,
    size: u64,
    file: Option<File>,
}

impl FirmwareTarget {
    /// Open and stat the image. Nothing is sent to the device yet.
    pub async fn open(endpoint: Endpoint, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let file = File::open(path).await.map_err(|e| {
            io::Error::new(e.kind(), format!("unable to open {:?}: {}", path, e))
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|e| io::Error::new(e.kind(), format!("unable to stat {:?}: {}", path, e)))?
            .len();
        let base_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{:?} does not name a file", path),
                )
            })?;

        Ok(Self {
            endpoint,
            path: path.to_path_buf(),
            base_name,
            size,
            file: Some(file),
        })
    }

    pub fn hostname(&self) -> &str {
        &self.endpoint.hostname
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Upload the image to the device's staging area.
    ///
    /// Publishes progress on `progress` and closes it when done. A failure
    /// is published as the last message before the close.
    pub async fn load(
        &mut self,
        cancel: &CancellationToken,
        options: &TransferOptions,
        progress: ProgressSender,
    ) -> Result<()> {
        let result = self.upload(cancel, options, &progress).await;
        match &result {
            Ok(()) => progress.done("Successfully uploaded file").await,
            Err(e) => progress.fail(e).await,
        }
        result
    }

    async fn upload(
        &mut self,
        cancel: &CancellationToken,
        options: &TransferOptions,
        progress: &ProgressSender,
    ) -> Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => File::open(&self.path).await?,
        };

        progress.running(0.0, "Connecting...").await;

        let meter = Arc::new(UploadMeter::new(self.size));
        let body = Body::wrap_stream(metered_stream(file, meter.clone()));
        let part = Part::stream_with_length(body, self.size)
            .file_name(self.base_name.clone())
            .mime_str(FIRMWARE_MIME)?;
        let form = Form::new().part(FIRMWARE_FIELD, part);

        log::debug!(
            "{}: uploading {} ({} bytes)",
            self.hostname(),
            self.base_name,
            self.size
        );

        // a known part length gives the request an exact Content-Length
        let client = &self.endpoint.client;
        let request = client
            .request(Method::POST, FIRMWARE_FILE_PATH)
            .multipart(form);

        let response = tokio::select! {
            response = client.send(request) => response?,
            stalled = report_upload(&meter, options.progress_rate, options.stall_timeout, progress) => {
                return Err(stalled);
            }
            _ = cancel.cancelled() => return Err(BspError::Cancelled),
        };

        match response.status() {
            StatusCode::CREATED => Ok(()),
            status => Err(BspError::UnexpectedStatus {
                operation: "upload firmware",
                status,
            }),
        }
    }

    /// Install the staged image and follow the installation until it ends
    pub async fn apply(
        &self,
        cancel: &CancellationToken,
        options: &TransferOptions,
        progress: ProgressSender,
    ) -> Result<()> {
        let result = tokio::select! {
            result = self.install(options, &progress) => result,
            _ = cancel.cancelled() => Err(BspError::Cancelled),
        };

        match &result {
            Ok(()) => progress.done("Successfully installed firmware.").await,
            Err(e) => progress.fail(e).await,
        }
        result
    }

    async fn install(&self, options: &TransferOptions, progress: &ProgressSender) -> Result<()> {
        let client = &self.endpoint.client;

        let response = client
            .send(client.request(Method::PUT, FIRMWARE_UPGRADE_PATH))
            .await?;
        if response.status() != StatusCode::ACCEPTED {
            return Err(BspError::UnexpectedStatus {
                operation: "start upgrade",
                status: response.status(),
            });
        }

        let interval = options.poll_interval();
        loop {
            tokio::time::sleep(interval).await;

            let response = match client
                .send(client.request(Method::GET, FIRMWARE_UPGRADE_PATH))
                .await
            {
                Ok(response) => response,
                Err(e @ BspError::Transport { .. }) => {
                    log::debug!("{}: upgrade poll failed: {}", self.hostname(), e);
                    progress.running(0.0, format!("ERR: {}", e)).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match response.status() {
                StatusCode::CREATED => return Ok(()),
                StatusCode::NOT_FOUND => return Err(BspError::NoFirmwareStaged),
                StatusCode::INTERNAL_SERVER_ERROR => return Err(BspError::InstallFailed),
                StatusCode::OK | StatusCode::ACCEPTED => {}
                status => {
                    return Err(BspError::UnexpectedStatus {
                        operation: "poll upgrade",
                        status,
                    });
                }
            }

            // the device said all is well; a body we cannot read is only reported
            match response.json::<UpgradeState>().await {
                Ok(state) => match state.current() {
                    Some((ratio, text)) => progress.running(ratio, text).await,
                    None => progress.running(0.0, "ERR: no progress lines").await,
                },
                Err(e) => progress.running(0.0, format!("ERR: {}", e)).await,
            }
        }
    }
}
