//! TCP connect probe

use super::ProbeOutcome;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};

/// A single bounded connection attempt against `target:port`.
///
/// The scheduler and the liveness checker only talk to this trait, so a
/// stub can stand in for the network in tests.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &str, port: u16, timeout: Duration) -> ProbeOutcome;
}

#[async_trait]
impl<P: Prober + ?Sized> Prober for Arc<P> {
    async fn probe(&self, target: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        (**self).probe(target, port, timeout).await
    }
}

/// TCP connect prober, no privileges required
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProber;

impl TcpConnectProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Prober for TcpConnectProber {
    async fn probe(&self, target: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        // Resolution counts against the same budget as the connect
        let outcome = match tokio::time::timeout(timeout, connect(target, port)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::TimedOut,
        };

        log::trace!("{}:{} {}", target, port, outcome);
        outcome
    }
}

async fn connect(target: &str, port: u16) -> ProbeOutcome {
    let host = target.trim_start_matches('[').trim_end_matches(']');

    let addrs = match lookup_host((host, port)).await {
        Ok(addrs) => addrs,
        Err(e) => {
            log::trace!("Failed to resolve {}: {}", host, e);
            return ProbeOutcome::ResolutionFailed;
        }
    };

    let mut outcome = ProbeOutcome::ResolutionFailed;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                drop(stream);
                return ProbeOutcome::Open;
            }
            Err(e) => outcome = classify(&e),
        }
    }

    outcome
}

fn classify(error: &io::Error) -> ProbeOutcome {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => ProbeOutcome::Refused,
        io::ErrorKind::TimedOut => ProbeOutcome::TimedOut,
        _ => ProbeOutcome::Unreachable,
    }
}

/// Check whether `host:port` accepts a TCP connection within `timeout`.
///
/// Refused, timed out, unresolvable and unreachable all report `false`.
pub async fn probe_open(host: &str, port: u16, timeout: Duration) -> bool {
    TcpConnectProber.probe(host, port, timeout).await.is_open()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port_on_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let outcome = TcpConnectProber
            .probe("127.0.0.1", port, Duration::from_secs(1))
            .await;
        assert_eq!(outcome, ProbeOutcome::Open);
        assert!(probe_open("localhost", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_closed_port_on_loopback() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let outcome = TcpConnectProber
            .probe("127.0.0.1", port, Duration::from_secs(1))
            .await;
        assert_eq!(outcome, ProbeOutcome::Refused);
        assert!(!probe_open("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_closed() {
        let start = Instant::now();
        let outcome = TcpConnectProber
            .probe("host.that.does.not.exist.invalid", 80, Duration::from_millis(500))
            .await;

        assert!(!outcome.is_open());
        assert!(matches!(
            outcome,
            ProbeOutcome::ResolutionFailed | ProbeOutcome::TimedOut
        ));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connect_respects_timeout() {
        // TEST-NET-3; some networks answer for it, so only the bound is checked
        let start = Instant::now();
        let _ = probe_open("203.0.113.1", 80, Duration::from_millis(200)).await;

        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_classify_errors() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        let other = io::Error::from(io::ErrorKind::PermissionDenied);

        assert_eq!(classify(&refused), ProbeOutcome::Refused);
        assert_eq!(classify(&timed_out), ProbeOutcome::TimedOut);
        assert_eq!(classify(&other), ProbeOutcome::Unreachable);
    }
}
