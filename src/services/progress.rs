//! Progress channels between deployment phases and their observers

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::models::{Phase, ProgressEvent, ProgressMessage};

/// Channel carrying one phase's progress for one target.
///
/// Capacity 1, so a phase runs at most one message ahead of its observer.
/// The channel closes when the phase drops its sender.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ProgressSender { tx }, rx)
}

pub type ProgressReceiver = mpsc::Receiver<ProgressMessage>;

/// Sending half owned by a running phase
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressMessage>,
}

impl ProgressSender {
    /// Returns false when nobody listens any more
    pub async fn send(&self, message: ProgressMessage) -> bool {
        self.tx.send(message).await.is_ok()
    }

    pub async fn running(&self, ratio: f64, status: impl Into<String>) {
        self.send(ProgressMessage::running(ratio, status)).await;
    }

    /// Final success message; closes the channel
    pub async fn done(self, status: impl Into<String>) {
        self.send(ProgressMessage::done(status)).await;
    }

    /// Final failure message; closes the channel
    pub async fn fail(self, error: impl fmt::Display) {
        self.send(ProgressMessage::failed(error)).await;
    }
}

/// Consumer of tagged progress events
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: ProgressEvent);
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn publish(&self, event: ProgressEvent) {
        // a consumer that went away just stops seeing updates
        let _ = self.send(event);
    }
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn publish(&self, event: ProgressEvent) {
        let ProgressEvent {
            target,
            phase,
            message,
        } = event;

        match message.error {
            Some(error) => log::error!("{} [{}]: {}", target, phase, error),
            None => log::info!(
                "{} [{}] {:>3.0}% {}",
                target,
                phase,
                message.ratio * 100.0,
                message.status
            ),
        }
    }
}

/// Latest message per target and phase; later events replace earlier ones
#[derive(Debug, Default)]
pub struct ProgressBoard {
    state: Mutex<BTreeMap<(String, Phase), ProgressMessage>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &str, phase: Phase) -> Option<ProgressMessage> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(target.to_string(), phase))
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|((target, phase), message)| ProgressEvent {
                target: target.clone(),
                phase: *phase,
                message: message.clone(),
            })
            .collect()
    }
}

impl ProgressSink for ProgressBoard {
    fn publish(&self, event: ProgressEvent) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((event.target, event.phase), event.message);
    }
}

/// Drain `rx` into `sink` until the phase closes the channel.
///
/// Returns the last message seen.
pub async fn forward(
    target: &str,
    phase: Phase,
    mut rx: ProgressReceiver,
    sink: &dyn ProgressSink,
) -> Option<ProgressMessage> {
    let mut last = None;
    while let Some(message) = rx.recv().await {
        sink.publish(ProgressEvent {
            target: target.to_string(),
            phase,
            message: message.clone(),
        });
        last = Some(message);
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_done_closes_channel() {
        let (tx, rx) = progress_channel();
        let board = ProgressBoard::new();

        let phase = async move {
            tx.running(0.5, "halfway").await;
            tx.done("finished").await;
        };
        let (_, last) = tokio::join!(phase, forward("bu1", Phase::Load, rx, &board));

        let last = last.unwrap();
        assert!(last.is_done());
        assert_eq!(board.get("bu1", Phase::Load), Some(last));
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let (tx, rx) = progress_channel();
        let board = ProgressBoard::new();

        let phase = async move {
            tx.running(0.1, "Connecting...").await;
            tx.fail(crate::errors::BspError::InstallFailed).await;
        };
        let (_, last) = tokio::join!(phase, forward("bu2", Phase::Apply, rx, &board));

        let last = last.unwrap();
        assert!(last.error.unwrap().starts_with("Failed: failed to install image"));
    }

    #[test]
    fn test_board_keeps_latest_per_phase() {
        let board = ProgressBoard::new();
        for (target, phase, status) in [
            ("a", Phase::Load, "one"),
            ("a", Phase::Load, "two"),
            ("a", Phase::Apply, "three"),
            ("b", Phase::Load, "four"),
        ] {
            board.publish(ProgressEvent {
                target: target.to_string(),
                phase,
                message: ProgressMessage::running(0.0, status),
            });
        }

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(board.get("a", Phase::Load).unwrap().status, "two");
        assert_eq!(board.get("a", Phase::Apply).unwrap().status, "three");
    }

    #[tokio::test]
    async fn test_unbounded_sender_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.publish(ProgressEvent {
            target: "x".to_string(),
            phase: Phase::Apply,
            message: ProgressMessage::done("ok"),
        });
        assert_eq!(rx.recv().await.unwrap().target, "x");
    }
}
