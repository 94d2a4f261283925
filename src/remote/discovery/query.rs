//! Sending mDNS questions on every usable interface

use hickory_proto::op::{Message, Query};
use socket2::{Domain, SockAddr};
use std::collections::BTreeMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::dns;
use super::listen::{MDNS_IPV4, MDNS_IPV6, MDNS_PORT, reusable_socket};
use crate::errors::{BspError, Result};

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Delays between repeated queries: 1, 2, 4 ... 32 s, then 60 s forever
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            next: INITIAL_DELAY,
        }
    }
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (delay * 2).min(MAX_DELAY);
        delay
    }
}

/// A network interface we may multicast on
#[derive(Debug, Clone)]
pub struct NetInterface {
    pub name: String,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6_index: Option<u32>,
}

/// Interfaces that are up, not loopback and not point-to-point.
///
/// Point-to-point links show up as host-only netmasks without broadcast.
pub fn usable_interfaces() -> io::Result<Vec<NetInterface>> {
    Ok(select_interfaces(if_addrs::get_if_addrs()?))
}

fn select_interfaces(addresses: Vec<if_addrs::Interface>) -> Vec<NetInterface> {
    let mut by_name: BTreeMap<String, NetInterface> = BTreeMap::new();

    for iface in addresses {
        if !iface.is_oper_up() {
            log::trace!("{}: interface is down, skipped", iface.name);
            continue;
        }
        if iface.is_loopback() {
            log::trace!("{}: loopback interface, skipped", iface.name);
            continue;
        }

        let entry = by_name
            .entry(iface.name.clone())
            .or_insert_with(|| NetInterface {
                name: iface.name.clone(),
                ipv4: None,
                ipv6_index: None,
            });

        match &iface.addr {
            if_addrs::IfAddr::V4(v4) => {
                if v4.netmask == Ipv4Addr::BROADCAST && v4.broadcast.is_none() {
                    log::trace!("{}: point to point ipv4 address, skipped", iface.name);
                    continue;
                }
                entry.ipv4.get_or_insert(v4.ip);
            }
            if_addrs::IfAddr::V6(v6) => {
                if v6.netmask.segments().iter().all(|s| *s == 0xffff) {
                    log::trace!("{}: point to point ipv6 address, skipped", iface.name);
                    continue;
                }
                if entry.ipv6_index.is_none() {
                    entry.ipv6_index = iface.index;
                }
            }
        }
    }

    by_name
        .into_values()
        .filter(|iface| iface.ipv4.is_some() || iface.ipv6_index.is_some())
        .collect()
}

/// Send `msg` to the mDNS groups on every usable interface.
///
/// Each protocol succeeds if at least one interface took the packet; the
/// call fails only when both protocols failed everywhere.
pub fn query(msg: &Message) -> Result<()> {
    let payload = dns::encode(msg)?;
    let interfaces = usable_interfaces()?;

    let ipv4 = send_all(&interfaces, "udp4", |iface| {
        let ip = iface.ipv4.ok_or_else(|| no_address("ipv4"))?;
        send_ipv4(&payload, ip)
    });
    let ipv6 = send_all(&interfaces, "udp6", |iface| {
        let index = iface.ipv6_index.ok_or_else(|| no_address("ipv6"))?;
        send_ipv6(&payload, index)
    });

    match (ipv4, ipv6) {
        (Err(ipv4), Err(ipv6)) => Err(BspError::Query { ipv4, ipv6 }),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => {
            log::trace!("mDNS query partially sent: {}", e);
            Ok(())
        }
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn no_address(family: &str) -> io::Error {
    io::Error::new(io::ErrorKind::AddrNotAvailable, format!("no {} address", family))
}

fn send_all<F>(interfaces: &[NetInterface], protocol: &str, send: F) -> std::result::Result<(), String>
where
    F: Fn(&NetInterface) -> io::Result<()>,
{
    let mut errors = Vec::new();
    let mut sent = 0;

    for iface in interfaces {
        match send(iface) {
            Ok(()) => sent += 1,
            Err(e) => errors.push(format!(
                "{}: failed to send {} dns query: {}",
                iface.name, protocol, e
            )),
        }
    }

    if sent > 0 {
        return Ok(());
    }
    if errors.is_empty() {
        return Err("no usable interfaces".to_string());
    }
    Err(format!("all interfaces failed\n{}", errors.join("\n")))
}

// Sent from port 5353 so responders answer on the multicast group
// rather than unicast back to an ephemeral port.
fn send_ipv4(payload: &[u8], ip: Ipv4Addr) -> io::Result<()> {
    let socket = reusable_socket(Domain::IPV4)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, MDNS_PORT)).into())?;
    socket.set_multicast_if_v4(&ip)?;
    socket.set_multicast_ttl_v4(255)?;
    let group = SockAddr::from(SocketAddrV4::new(MDNS_IPV4, MDNS_PORT));
    socket.send_to(payload, &group)?;
    Ok(())
}

fn send_ipv6(payload: &[u8], index: u32) -> io::Result<()> {
    let socket = reusable_socket(Domain::IPV6)?;
    socket.bind(&SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, MDNS_PORT)).into())?;
    socket.set_multicast_if_v6(index)?;
    socket.set_multicast_hops_v6(255)?;
    let group = SockAddr::from(SocketAddrV6::new(MDNS_IPV6, MDNS_PORT, 0, index));
    socket.send_to(payload, &group)?;
    Ok(())
}

async fn send(msg: Message) {
    match tokio::task::spawn_blocking(move || query(&msg)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("mDNS query failed: {}", e),
        Err(e) => log::error!("mDNS query task failed: {}", e),
    }
}

/// Repeat `question` with [`Backoff`] and send follow-up questions as they
/// arrive, until `cancel` fires.
pub(super) async fn query_loop(
    question: Message,
    mut follow_ups: mpsc::UnboundedReceiver<Query>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::default();

    loop {
        send(question.clone()).await;

        let delay = backoff.next_delay();
        log::trace!("next mDNS query in {:?}", delay);
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = &mut sleep => break,
                Some(follow_up) = follow_ups.recv() => {
                    send(dns::query(follow_up)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..9).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn test_send_all_succeeds_if_one_interface_does() {
        let interfaces = vec![
            NetInterface {
                name: "eth0".to_string(),
                ipv4: None,
                ipv6_index: None,
            },
            NetInterface {
                name: "eth1".to_string(),
                ipv4: Some(Ipv4Addr::new(10, 0, 0, 2)),
                ipv6_index: None,
            },
        ];

        let result = send_all(&interfaces, "udp4", |iface| {
            iface.ipv4.map(|_| ()).ok_or_else(|| no_address("ipv4"))
        });
        assert!(result.is_ok());

        let result = send_all(&interfaces, "udp6", |iface| {
            iface.ipv6_index.map(|_| ()).ok_or_else(|| no_address("ipv6"))
        });
        let err = result.unwrap_err();
        assert!(err.contains("eth0: failed to send udp6 dns query"));
        assert!(err.contains("eth1"));
    }

    #[cfg(not(windows))]
    fn ipv4_interface(name: &str, ip: [u8; 4], oper_status: if_addrs::IfOperStatus) -> if_addrs::Interface {
        if_addrs::Interface {
            name: name.to_string(),
            addr: if_addrs::IfAddr::V4(if_addrs::Ifv4Addr {
                ip: Ipv4Addr::from(ip),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                prefixlen: 24,
                broadcast: Some(Ipv4Addr::new(ip[0], ip[1], ip[2], 255)),
            }),
            index: Some(2),
            oper_status,
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn test_down_and_loopback_interfaces_are_skipped() {
        use if_addrs::IfOperStatus;

        let selected = select_interfaces(vec![
            ipv4_interface("eth0", [192, 168, 1, 10], IfOperStatus::Up),
            ipv4_interface("eth1", [10, 0, 0, 2], IfOperStatus::Down),
            ipv4_interface("lo", [127, 0, 0, 1], IfOperStatus::Up),
        ]);

        let names: Vec<&str> = selected.iter().map(|iface| iface.name.as_str()).collect();
        assert_eq!(names, vec!["eth0"]);
        assert_eq!(selected[0].ipv4, Some(Ipv4Addr::new(192, 168, 1, 10)));
    }

    #[test]
    fn test_send_all_without_interfaces_fails() {
        assert!(send_all(&[], "udp4", |_| Ok(())).is_err());
    }
}
