//! Turns mDNS messages into an ordered, de-duplicated set of targets

use hickory_proto::op::{Message, Query};
use hickory_proto::rr::RecordType;
use std::collections::HashSet;

use super::dns::{self, hostname};
use crate::models::Target;

/// What a single message contributed
#[derive(Debug, Default)]
pub struct Resolution {
    /// SRV questions to send for instances announced by PTR records
    pub follow_ups: Vec<Query>,
    /// One full snapshot per newly accepted hostname, oldest first
    pub snapshots: Vec<Vec<Target>>,
}

/// Owned by the browse task alone; never shared, so never locked
#[derive(Debug)]
pub struct Resolver {
    question: Query,
    targets: Vec<Target>,
    index: HashSet<String>,
}

impl Resolver {
    pub fn new(question: Query) -> Self {
        Self {
            question,
            targets: Vec::new(),
            index: HashSet::new(),
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn handle(&mut self, msg: &Message) -> Resolution {
        let mut resolution = Resolution::default();
        let service = self.question.name();

        for record in dns::records(msg) {
            if let Some(instance) = dns::ptr_target(record) {
                if record.name() != service {
                    continue;
                }
                let follow_up = Query::query(instance.clone(), RecordType::SRV);
                if !resolution.follow_ups.contains(&follow_up) {
                    resolution.follow_ups.push(follow_up);
                }
            } else if let Some(target) = dns::srv_target(record) {
                if !service.zone_of(record.name()) {
                    continue;
                }
                let hostname = hostname(target);
                if hostname.is_empty() || !self.index.insert(hostname.clone()) {
                    continue;
                }

                log::debug!("mDNS: discovered {} via {}", hostname, record.name());
                self.targets.push(Target::new(&hostname));
                resolution.snapshots.push(self.targets.clone());
            }
        }

        resolution
    }
}
