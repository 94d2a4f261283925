//! Upload accounting: throttled progress and stall detection

use bytes::Bytes;
use futures_util::{Stream, StreamExt, future, stream};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::io::ReaderStream;

use super::progress::ProgressSender;
use crate::errors::BspError;
use crate::utils::format::human_bytes;

/// Upload progress is never reported more often than this
pub const MAX_PROGRESS_RATE: f64 = 5.0;

/// Slowest progress reporting, whatever rate is configured
const MAX_PROGRESS_PERIOD: Duration = Duration::from_secs(60);

/// Time without writes after which an upload counts as stalled
pub const STALL_GRACE: Duration = Duration::from_secs(1);

const CHUNK_SIZE: usize = 32 * 1024;

/// Counts bytes handed to the HTTP client and when the last ones went out
#[derive(Debug)]
pub struct UploadMeter {
    total: u64,
    written: AtomicU64,
    last_write: Mutex<Instant>,
    finished: AtomicBool,
}

impl UploadMeter {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            written: AtomicU64::new(0),
            last_write: Mutex::new(Instant::now()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn record(&self, bytes: usize) {
        self.written.fetch_add(bytes as u64, Ordering::Relaxed);
        *self
            .last_write
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Every byte of the file went out; only the device's answer is pending
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Time since the last write, or since creation if nothing was written
    pub fn idle(&self) -> Duration {
        self.last_write
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.written() as f64 / self.total as f64
    }
}

/// File contents as a body stream, counted on `meter`.
///
/// The reader is dropped as soon as it reaches EOF, at which point the
/// meter is marked finished.
pub fn metered_stream<R>(
    file: R,
    meter: Arc<UploadMeter>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    R: AsyncRead + Send + 'static,
{
    let counter = meter.clone();
    let chunks = ReaderStream::with_capacity(file, CHUNK_SIZE).inspect(move |chunk| {
        if let Ok(chunk) = chunk {
            counter.record(chunk.len());
        }
    });
    let eof = stream::once(async move { meter.finish() })
        .filter_map(|()| future::ready(None::<io::Result<Bytes>>));

    chunks.chain(eof)
}

fn progress_period(progress_rate: f64) -> Duration {
    let rate = if progress_rate.is_finite() && progress_rate > 0.0 {
        progress_rate.min(MAX_PROGRESS_RATE)
    } else {
        MAX_PROGRESS_RATE
    };
    Duration::try_from_secs_f64(1.0 / rate)
        .unwrap_or(MAX_PROGRESS_PERIOD)
        .min(MAX_PROGRESS_PERIOD)
}

/// Publish upload progress while the file is being sent.
///
/// Meant to be raced against the request; it only returns when sending
/// stalls for `stall_timeout`. Once the whole file went out it reports that
/// once and stays pending, so the device may take as long as the request
/// allows to answer. Running updates go out at most `progress_rate` times
/// per second, stall notices once per second.
pub async fn report_upload(
    meter: &UploadMeter,
    progress_rate: f64,
    stall_timeout: Duration,
    progress: &ProgressSender,
) -> BspError {
    let period = progress_period(progress_rate);

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_written = 0;
    let mut last_stall_notice: Option<Instant> = None;

    loop {
        ticker.tick().await;

        let written = meter.written();
        if meter.is_finished() {
            progress
                .running(
                    meter.ratio(),
                    format!(
                        "{} of {} (waiting for device)",
                        human_bytes(written),
                        human_bytes(meter.total())
                    ),
                )
                .await;
            return std::future::pending().await;
        }

        let idle = meter.idle();

        if idle >= stall_timeout {
            return BspError::Stalled {
                timeout: stall_timeout,
            };
        }

        if idle >= STALL_GRACE {
            if last_stall_notice.is_none_or(|at| at.elapsed() >= Duration::from_secs(1)) {
                let remaining = stall_timeout.saturating_sub(idle).as_secs();
                progress
                    .running(
                        meter.ratio(),
                        format!(
                            "{} of {} (stalled, timeout in {}s)",
                            human_bytes(written),
                            human_bytes(meter.total()),
                            remaining
                        ),
                    )
                    .await;
                last_stall_notice = Some(Instant::now());
            }
            continue;
        }

        last_stall_notice = None;
        if written == last_written {
            continue;
        }

        let per_second = ((written - last_written) as f64 / period.as_secs_f64()) as u64;
        progress
            .running(
                meter.ratio(),
                format!(
                    "{} of {} ({}/sec)",
                    human_bytes(written),
                    human_bytes(meter.total()),
                    human_bytes(per_second)
                ),
            )
            .await;
        last_written = written;
    }
}
