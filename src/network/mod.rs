//! Network module for connection probes and ICMP echo

pub mod icmp;
pub mod probe;

use serde::{Deserialize, Serialize};

pub use icmp::{EchoOutcome, EchoProbe, IcmpEcho, IcmpPinger};
pub use probe::{probe_open, Prober, TcpConnectProber};

/// Outcome of a single connection attempt.
///
/// Only [`ProbeOutcome::Open`] counts as open; every other variant is
/// reported as closed through [`ProbeOutcome::is_open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// Connection established
    Open,
    /// Connection actively refused (RST)
    Refused,
    /// No answer before the timeout
    TimedOut,
    /// Host name could not be resolved
    ResolutionFailed,
    /// Any other failure (network unreachable, host unreachable, ...)
    Unreachable,
}

impl ProbeOutcome {
    pub fn is_open(&self) -> bool {
        matches!(self, ProbeOutcome::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Open => "open",
            ProbeOutcome::Refused => "refused",
            ProbeOutcome::TimedOut => "timed out",
            ProbeOutcome::ResolutionFailed => "resolution failed",
            ProbeOutcome::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of probing a single port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub port: u16,
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    pub fn new(port: u16, outcome: ProbeOutcome) -> Self {
        Self { port, outcome }
    }

    pub fn is_open(&self) -> bool {
        self.outcome.is_open()
    }
}
