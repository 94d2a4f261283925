//! Multicast listeners for mDNS traffic

use hickory_proto::op::Message;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::dns;
use super::query::usable_interfaces;
use crate::errors::{BspError, Result};

pub const MDNS_PORT: u16 = 5353;
pub const MDNS_IPV4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_IPV6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

const MAX_PACKET: usize = 65536;

/// UDP socket on the mDNS port that tolerates other responders on the host
pub(super) fn reusable_socket(domain: Domain) -> io::Result<Socket> {
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    if domain == Domain::IPV6 {
        socket.set_only_v6(true)?;
    }
    Ok(socket)
}

fn bind_ipv4() -> io::Result<UdpSocket> {
    let socket = reusable_socket(Domain::IPV4)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, MDNS_PORT)).into())?;

    let mut joined = 0;
    for iface in usable_interfaces().unwrap_or_default() {
        let Some(ip) = iface.ipv4 else { continue };
        match socket.join_multicast_v4(&MDNS_IPV4, &ip) {
            Ok(()) => joined += 1,
            Err(e) => log::debug!("{}: could not join {}: {}", iface.name, MDNS_IPV4, e),
        }
    }
    if joined == 0 {
        socket.join_multicast_v4(&MDNS_IPV4, &Ipv4Addr::UNSPECIFIED)?;
    }

    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

fn bind_ipv6() -> io::Result<UdpSocket> {
    let socket = reusable_socket(Domain::IPV6)?;
    socket.bind(&SocketAddr::from((Ipv6Addr::UNSPECIFIED, MDNS_PORT)).into())?;

    let mut joined = 0;
    for iface in usable_interfaces().unwrap_or_default() {
        let Some(index) = iface.ipv6_index else { continue };
        match socket.join_multicast_v6(&MDNS_IPV6, index) {
            Ok(()) => joined += 1,
            Err(e) => log::debug!("{}: could not join {}: {}", iface.name, MDNS_IPV6, e),
        }
    }
    if joined == 0 {
        socket.join_multicast_v6(&MDNS_IPV6, 0)?;
    }

    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

/// Bind the IPv4 and IPv6 listeners and start one reader per socket.
///
/// Fails only if neither protocol could be bound. The returned channel
/// closes once every reader has exited, which happens when `cancel` fires
/// or a socket read fails.
pub fn listen(cancel: CancellationToken) -> Result<mpsc::Receiver<Message>> {
    let mut listeners = Vec::with_capacity(2);

    let ipv4 = match bind_ipv4() {
        Ok(socket) => {
            listeners.push(("ipv4", socket));
            None
        }
        Err(e) => Some(e),
    };
    let ipv6 = match bind_ipv6() {
        Ok(socket) => {
            listeners.push(("ipv6", socket));
            None
        }
        Err(e) => Some(e),
    };

    match (ipv4, ipv6) {
        (Some(ipv4), Some(ipv6)) => return Err(BspError::Listen { ipv4, ipv6 }),
        (Some(e), None) => log::warn!("unable to listen on ipv4 multicast, ipv6 only: {}", e),
        (None, Some(e)) => log::warn!("unable to listen on ipv6 multicast, ipv4 only: {}", e),
        (None, None) => {}
    }

    let (tx, rx) = mpsc::channel(16);
    for (protocol, socket) in listeners {
        tokio::spawn(read_loop(protocol, socket, tx.clone(), cancel.clone()));
    }

    Ok(rx)
}

async fn read_loop(
    protocol: &'static str,
    socket: UdpSocket,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
) {
    let mut buffer = vec![0u8; MAX_PACKET];

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buffer) => received,
        };

        let (len, from) = match received {
            Ok(received) => received,
            Err(e) => {
                log::warn!("mDNS {} listener: error reading packet: {}", protocol, e);
                break;
            }
        };

        let msg = match dns::decode(&buffer[..len]) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Failed to parse mDNS packet from {}: {}", from, e);
                continue;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(msg) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    log::debug!("mDNS {} listener stopped", protocol);
}
