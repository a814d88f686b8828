//! Host liveness check
//!
//! A host counts as alive when one of a few commonly open ports accepts a
//! connection. Only when all of them fail is an ICMP echo attempted.

use crate::network::{EchoOutcome, EchoProbe, Prober};
use std::time::Duration;

/// Ports tried in order before falling back to ICMP
pub const LIVENESS_PORTS: [u16; 3] = [80, 443, 22];

/// Timeout for each TCP liveness probe
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout for the echo fallback
pub const ECHO_TIMEOUT: Duration = Duration::from_secs(1);

/// Verdict of a liveness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// A TCP connection to this port succeeded
    Tcp(u16),
    /// The host answered an ICMP echo
    EchoReply(Duration),
    /// No TCP port answered and the echo went unanswered
    Down,
    /// No TCP port answered and the echo could not be sent from here
    EchoUnavailable(String),
}

impl Liveness {
    /// Collapse the verdict to the boolean the caller acts on.
    ///
    /// `EchoUnavailable` counts as down.
    pub fn is_alive(&self) -> bool {
        matches!(self, Liveness::Tcp(_) | Liveness::EchoReply(_))
    }

    pub fn describe(&self) -> String {
        match self {
            Liveness::Tcp(port) => format!("tcp/{} accepted a connection", port),
            Liveness::EchoReply(rtt) => format!("echo reply in {}ms", rtt.as_millis()),
            Liveness::Down => "no response".to_string(),
            Liveness::EchoUnavailable(reason) => format!("echo probe unavailable: {}", reason),
        }
    }
}

pub struct LivenessChecker<P, E> {
    prober: P,
    echo: E,
    probe_timeout: Duration,
    echo_timeout: Duration,
}

impl<P: Prober, E: EchoProbe> LivenessChecker<P, E> {
    pub fn new(prober: P, echo: E) -> Self {
        Self {
            prober,
            echo,
            probe_timeout: LIVENESS_TIMEOUT,
            echo_timeout: ECHO_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, probe_timeout: Duration, echo_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self.echo_timeout = echo_timeout;
        self
    }

    pub async fn check(&self, target: &str) -> Liveness {
        for port in LIVENESS_PORTS {
            let outcome = self.prober.probe(target, port, self.probe_timeout).await;
            if outcome.is_open() {
                log::debug!("{} is up: tcp/{} open", target, port);
                return Liveness::Tcp(port);
            }
            log::debug!("Liveness probe {}:{} {}", target, port, outcome);
        }

        match self.echo.echo(target, self.echo_timeout).await {
            EchoOutcome::Reply(rtt) => Liveness::EchoReply(rtt),
            EchoOutcome::NoReply => Liveness::Down,
            EchoOutcome::Unavailable(reason) => {
                log::warn!(
                    "ICMP echo to {} unavailable ({}); run as root or grant CAP_NET_RAW to use the echo fallback",
                    target,
                    reason
                );
                Liveness::EchoUnavailable(reason)
            }
        }
    }

    pub async fn is_alive(&self, target: &str) -> bool {
        self.check(target).await.is_alive()
    }
}
