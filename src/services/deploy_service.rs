//! Fleet-wide firmware deployment
//!
//! Every target is loaded first. Only when all uploads succeeded does the
//! fleet move on to installing, so a partial upload never leaves some
//! devices running new firmware and others not.

use futures_util::future::join_all;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

use super::firmware_target::{FirmwareTarget, TransferOptions};
use super::progress::{ProgressSink, forward, progress_channel};
use crate::config::{DeployConfig, MAX_CONCURRENCY_LIMIT};
use crate::errors::{BspError, DeployError, TargetFailure};
use crate::models::{Phase, ProgressEvent, ProgressMessage};

/// Runs the two deployment phases across a set of targets
#[derive(Debug, Clone)]
pub struct Deployer {
    concurrency_limit: usize,
    options: TransferOptions,
}

impl Default for Deployer {
    fn default() -> Self {
        Self::from_config(&DeployConfig::default())
    }
}

impl Deployer {
    pub fn new(concurrency_limit: usize, options: TransferOptions) -> Self {
        Self {
            concurrency_limit: concurrency_limit.clamp(1, MAX_CONCURRENCY_LIMIT),
            options,
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(config.concurrency_limit, TransferOptions::from(config))
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Load then apply on every target.
    ///
    /// Each phase returns only after every target's progress stream has
    /// been drained into `sink` and closed, cancelled targets included.
    pub async fn deploy(
        &self,
        cancel: &CancellationToken,
        targets: &mut [FirmwareTarget],
        sink: &dyn ProgressSink,
    ) -> Result<(), DeployError> {
        // one pool of permits for both phases
        let semaphore = Semaphore::new(self.concurrency_limit);

        log::info!(
            "Loading firmware on {} target(s), {} at a time",
            targets.len(),
            self.concurrency_limit
        );

        let loads = targets.iter_mut().map(|target| {
            let semaphore = &semaphore;
            async move {
                let hostname = target.hostname().to_string();
                let (tx, rx) = progress_channel();
                let phase = async {
                    let Some(_permit) = acquire(semaphore, cancel).await else {
                        tx.fail(BspError::Cancelled).await;
                        return Err(BspError::Cancelled);
                    };
                    target.load(cancel, &self.options, tx).await
                };
                let (result, _) = tokio::join!(phase, forward(&hostname, Phase::Load, rx, sink));
                result.map_err(|error| TargetFailure { hostname, error })
            }
        });
        check(Phase::Load, join_all(loads).await)?;

        for target in targets.iter() {
            sink.publish(ProgressEvent {
                target: target.hostname().to_string(),
                phase: Phase::Apply,
                message: ProgressMessage::running(0.0, "Queued..."),
            });
        }

        log::info!("Applying firmware on {} target(s)", targets.len());

        let applies = targets.iter().map(|target| {
            let semaphore = &semaphore;
            async move {
                let hostname = target.hostname().to_string();
                let (tx, rx) = progress_channel();
                let phase = async {
                    let Some(_permit) = acquire(semaphore, cancel).await else {
                        tx.fail(BspError::Cancelled).await;
                        return Err(BspError::Cancelled);
                    };
                    target.apply(cancel, &self.options, tx).await
                };
                let (result, _) = tokio::join!(phase, forward(&hostname, Phase::Apply, rx, sink));
                result.map_err(|error| TargetFailure { hostname, error })
            }
        });
        check(Phase::Apply, join_all(applies).await)?;

        log::info!("Firmware deployed to {} target(s)", targets.len());
        Ok(())
    }
}

async fn acquire<'a>(
    semaphore: &'a Semaphore,
    cancel: &CancellationToken,
) -> Option<SemaphorePermit<'a>> {
    tokio::select! {
        permit = semaphore.acquire() => permit.ok(),
        _ = cancel.cancelled() => None,
    }
}

fn check(phase: Phase, results: Vec<Result<(), TargetFailure>>) -> Result<(), DeployError> {
    let failures: Vec<TargetFailure> = results.into_iter().filter_map(Result::err).collect();
    if failures.is_empty() {
        return Ok(());
    }

    for failure in &failures {
        log::error!("{} [{}]: {}", failure.hostname, phase, failure.error);
    }
    Err(DeployError { phase, failures })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_limit_is_bounded() {
        assert_eq!(Deployer::new(0, TransferOptions::default()).concurrency_limit(), 1);
        assert_eq!(
            Deployer::new(usize::MAX, TransferOptions::default()).concurrency_limit(),
            MAX_CONCURRENCY_LIMIT
        );
    }

    #[tokio::test]
    async fn test_huge_limit_deploys_nothing_without_panicking() {
        let deployer = Deployer::new(usize::MAX, TransferOptions::default());
        let sink = crate::services::ProgressBoard::new();
        deployer
            .deploy(&CancellationToken::new(), &mut [], &sink)
            .await
            .unwrap();
    }
}
