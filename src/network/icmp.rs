//! ICMP echo used as the last-resort liveness signal.
//!
//! Sending ICMP needs a raw socket, which on most systems means running as
//! root or holding `CAP_NET_RAW` (`sudo setcap cap_net_raw+ep $(which netscan)`).
//! Without it the echo probe reports [`EchoOutcome::Unavailable`] instead of
//! pretending the host is down.

use crate::ScanError;
use async_trait::async_trait;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::{IcmpCodes, MutableEchoRequestPacket};
use pnet::packet::icmp::{self, IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use rand::Rng;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

const ECHO_HEADER_LEN: usize = 8;
const ECHO_PAYLOAD: &[u8] = b"netscan-echo-probe";
const RECV_BUFFER_LEN: usize = 1500;

/// Result of one echo attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoOutcome {
    /// Echo reply received after the given round trip
    Reply(Duration),
    /// Nothing came back before the timeout, or the target did not resolve
    NoReply,
    /// The echo could not be sent from this environment at all
    Unavailable(String),
}

impl EchoOutcome {
    pub fn is_reply(&self) -> bool {
        matches!(self, EchoOutcome::Reply(_))
    }
}

/// A network-layer echo attempt with its own timeout
#[async_trait]
pub trait EchoProbe: Send + Sync {
    async fn echo(&self, target: &str, timeout: Duration) -> EchoOutcome;
}

#[async_trait]
impl<E: EchoProbe + ?Sized> EchoProbe for Arc<E> {
    async fn echo(&self, target: &str, timeout: Duration) -> EchoOutcome {
        (**self).echo(target, timeout).await
    }
}

/// Production echo probe: resolves the target and pings it over raw ICMPv4
#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpEcho;

#[async_trait]
impl EchoProbe for IcmpEcho {
    async fn echo(&self, target: &str, timeout_duration: Duration) -> EchoOutcome {
        let address = match resolve_ipv4(target).await {
            Ok(address) => address,
            Err(ScanError::InvalidTarget(reason)) => {
                log::debug!("Echo skipped for {}: {}", target, reason);
                return EchoOutcome::NoReply;
            }
            Err(e) => return EchoOutcome::Unavailable(e.to_string()),
        };

        let pinger = match IcmpPinger::new() {
            Ok(pinger) => pinger,
            Err(e) => return EchoOutcome::Unavailable(e.to_string()),
        };

        pinger.ping(address, timeout_duration).await
    }
}

async fn resolve_ipv4(target: &str) -> crate::Result<Ipv4Addr> {
    let host = target.trim_start_matches('[').trim_end_matches(']');
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ScanError::InvalidTarget(format!("failed to resolve {}: {}", host, e)))?;

    let mut saw_ipv6 = false;
    for addr in addrs {
        match addr.ip() {
            IpAddr::V4(v4) => return Ok(v4),
            IpAddr::V6(_) => saw_ipv6 = true,
        }
    }

    if saw_ipv6 {
        Err(ScanError::NetworkError(format!(
            "{} has no IPv4 address, ICMP echo supports IPv4 only",
            host
        )))
    } else {
        Err(ScanError::InvalidTarget(format!("no addresses found for {}", host)))
    }
}

/// Raw ICMPv4 socket able to send one echo request and wait for its reply
pub struct IcmpPinger {
    socket: Socket,
    identifier: u16,
}

impl IcmpPinger {
    /// Open the raw socket. Fails with [`ScanError::PermissionError`] when
    /// the process lacks raw socket privileges.
    pub fn new() -> crate::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                ScanError::PermissionError(
                    "raw ICMP socket requires root or CAP_NET_RAW".to_string(),
                )
            } else {
                ScanError::NetworkError(e.to_string())
            }
        })?;

        socket
            .set_nonblocking(true)
            .map_err(|e| ScanError::NetworkError(e.to_string()))?;

        Ok(Self {
            socket,
            identifier: rand::thread_rng().gen::<u16>(),
        })
    }

    /// Ping a single host
    pub async fn ping(&self, target: Ipv4Addr, timeout_duration: Duration) -> EchoOutcome {
        let start_time = Instant::now();

        if let Err(e) = self.send_echo(target) {
            log::debug!("Failed to send echo request to {}: {}", target, e);
            return EchoOutcome::NoReply;
        }

        match timeout(timeout_duration, self.wait_for_reply(target)).await {
            Ok(Ok(())) => EchoOutcome::Reply(start_time.elapsed()),
            Ok(Err(e)) => {
                log::debug!("Echo receive from {} failed: {}", target, e);
                EchoOutcome::NoReply
            }
            Err(_) => EchoOutcome::NoReply,
        }
    }

    fn send_echo(&self, target: Ipv4Addr) -> crate::Result<()> {
        let packet = build_echo_request(self.identifier, 1)?;
        let dest_addr = SockAddr::from(SocketAddr::new(IpAddr::V4(target), 0));

        self.socket
            .send_to(&packet, &dest_addr)
            .map_err(|e| ScanError::NetworkError(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_reply(&self, target: Ipv4Addr) -> io::Result<()> {
        let mut buffer = [0u8; RECV_BUFFER_LEN];

        loop {
            match (&self.socket).read(&mut buffer) {
                Ok(size) => {
                    if is_echo_reply(&buffer[..size], target, self.identifier) {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Build an ICMP echo request with a valid checksum
pub fn build_echo_request(identifier: u16, sequence: u16) -> crate::Result<Vec<u8>> {
    let mut buffer = vec![0u8; ECHO_HEADER_LEN + ECHO_PAYLOAD.len()];
    let mut echo = MutableEchoRequestPacket::new(&mut buffer)
        .ok_or_else(|| ScanError::NetworkError("echo buffer too small".to_string()))?;

    echo.set_icmp_type(IcmpTypes::EchoRequest);
    echo.set_icmp_code(IcmpCodes::NoCode);
    echo.set_identifier(identifier);
    echo.set_sequence_number(sequence);
    echo.set_payload(ECHO_PAYLOAD);

    let checksum = IcmpPacket::new(echo.packet())
        .map(|packet| icmp::checksum(&packet))
        .ok_or_else(|| ScanError::NetworkError("malformed echo request".to_string()))?;
    echo.set_checksum(checksum);

    Ok(buffer)
}

/// Whether a raw IPv4 datagram is the echo reply to our request
pub fn is_echo_reply(datagram: &[u8], target: Ipv4Addr, identifier: u16) -> bool {
    let ip_packet = match Ipv4Packet::new(datagram) {
        Some(packet) => packet,
        None => return false,
    };

    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Icmp
        || ip_packet.get_source() != target
    {
        return false;
    }

    let header_len = ip_packet.get_header_length() as usize * 4;
    if datagram.len() < header_len + ECHO_HEADER_LEN {
        return false;
    }

    match EchoReplyPacket::new(&datagram[header_len..]) {
        Some(reply) => {
            reply.get_icmp_type() == IcmpTypes::EchoReply && reply.get_identifier() == identifier
        }
        None => false,
    }
}
