//! mDNS messages for a PTR -> SRV browse, on top of hickory-proto

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::BinEncodable;

use crate::errors::{BspError, Result};

/// A question for `name`, made fully qualified
pub fn question(name: &str, record_type: RecordType) -> Result<Query> {
    let mut name = Name::from_ascii(name).map_err(dns_error)?;
    name.set_fqdn(true);
    Ok(Query::query(name, record_type))
}

/// A query carrying a single question. mDNS queries use id 0 and never
/// ask for recursion.
pub fn query(question: Query) -> Message {
    let mut msg = Message::new();
    msg.set_id(0)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(false)
        .add_query(question);
    msg
}

pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    msg.to_bytes().map_err(dns_error)
}

pub fn decode(packet: &[u8]) -> Result<Message> {
    Message::from_vec(packet).map_err(dns_error)
}

/// Answer and additional records, in packet order
pub fn records(msg: &Message) -> impl Iterator<Item = &Record> {
    msg.answers().iter().chain(msg.additionals().iter())
}

/// Pointed-to instance of a PTR record
pub fn ptr_target(record: &Record) -> Option<&Name> {
    match record.data() {
        Some(RData::PTR(ptr)) => Some(&ptr.0),
        _ => None,
    }
}

/// Target host of an SRV record
pub fn srv_target(record: &Record) -> Option<&Name> {
    match record.data() {
        Some(RData::SRV(srv)) => Some(srv.target()),
        _ => None,
    }
}

/// `name` as text without the trailing root dot
pub fn hostname(name: &Name) -> String {
    name.to_utf8().trim_end_matches('.').to_string()
}

fn dns_error(e: hickory_proto::error::ProtoError) -> BspError {
    BspError::Dns(e.to_string())
}

/// Responses as a device would multicast them
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use hickory_proto::rr::rdata::{PTR, SRV};

    pub fn name(name: &str) -> Name {
        let mut name = Name::from_ascii(name).unwrap();
        name.set_fqdn(true);
        name
    }

    pub fn ptr(owner: &str, instance: &str) -> Record {
        Record::from_rdata(name(owner), 4500, RData::PTR(PTR(name(instance))))
    }

    pub fn srv(owner: &str, target: &str, port: u16) -> Record {
        Record::from_rdata(name(owner), 120, RData::SRV(SRV::new(0, 0, port, name(target))))
    }

    pub fn response(answers: Vec<Record>, additionals: Vec<Record>) -> Message {
        let mut msg = Message::new();
        msg.set_message_type(MessageType::Response)
            .set_authoritative(true);
        for record in answers {
            msg.add_answer(record);
        }
        for record in additionals {
            msg.add_additional(record);
        }
        msg
    }
}
