//! Firmware deployment services
//!
//! [`Deployer`] drives a fleet through the two deployment phases, using a
//! [`FirmwareTarget`] per device and reporting through a [`ProgressSink`].

pub mod deploy_service;
pub mod firmware_target;
pub mod progress;
pub mod upload;

pub use deploy_service::Deployer;
pub use firmware_target::{FirmwareTarget, TransferOptions};
pub use progress::{
    LogSink, ProgressBoard, ProgressReceiver, ProgressSender, ProgressSink, progress_channel,
};
