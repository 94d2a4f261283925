//! mDNS discovery of controllers on the local network
//!
//! A [`Browser`] multicasts a PTR question, follows every PTR answer with
//! an SRV question, and streams the growing set of hostnames found in SRV
//! answers. Each stream item is the full, ordered set discovered so far.

pub mod dns;
pub mod listen;
pub mod query;
pub mod resolver;

use hickory_proto::op::{Message, Query};
use hickory_proto::rr::RecordType;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::models::Target;
pub use resolver::{Resolution, Resolver};

/// Browses the network for one service
#[derive(Debug, Clone)]
pub struct Browser {
    question: Query,
}

impl Browser {
    pub fn new(question: Query) -> Self {
        Self { question }
    }

    /// Browse for `service`, e.g. `_base-unit-deif._tcp.local`
    pub fn for_service(service: &str) -> Result<Self> {
        Ok(Self::new(dns::question(service, RecordType::PTR)?))
    }

    pub fn question(&self) -> &Query {
        &self.question
    }

    /// Start listening and querying.
    ///
    /// Runs until `cancel` fires or the returned receiver is dropped. The
    /// stream closes only after the socket readers have stopped.
    pub async fn run(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Vec<Target>>> {
        let cancel = cancel.child_token();
        let messages = listen::listen(cancel.clone())?;

        let (follow_tx, follow_rx) = mpsc::unbounded_channel();
        tokio::spawn(query::query_loop(
            dns::query(self.question.clone()),
            follow_rx,
            cancel.clone(),
        ));

        log::debug!("Browsing for {}", self.question.name());
        Ok(self.resolve(messages, follow_tx, cancel))
    }

    /// Resolve an incoming message stream into target snapshots.
    ///
    /// Follow-up SRV questions are handed to `follow_ups`. When this task
    /// ends, `cancel` fires so listeners and the query loop stop with it.
    pub fn resolve(
        &self,
        mut messages: mpsc::Receiver<Message>,
        follow_ups: mpsc::UnboundedSender<Query>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Vec<Target>> {
        let (tx, rx) = mpsc::channel(1);
        let mut resolver = Resolver::new(self.question.clone());

        tokio::spawn(async move {
            let _stop_all = cancel.clone().drop_guard();

            'messages: while let Some(msg) = messages.recv().await {
                let resolution = resolver.handle(&msg);

                for question in resolution.follow_ups {
                    let _ = follow_ups.send(question);
                }

                for snapshot in resolution.snapshots {
                    tokio::select! {
                        sent = tx.send(snapshot) => {
                            if sent.is_err() {
                                log::debug!("Discovery consumer went away");
                                return;
                            }
                        }
                        _ = cancel.cancelled() => break 'messages,
                    }
                }
            }

            // readers hold the senders; wait for all of them before closing
            while messages.recv().await.is_some() {}
            log::debug!(
                "Discovery stopped with {} target(s)",
                resolver.targets().len()
            );
        });

        rx
    }
}
