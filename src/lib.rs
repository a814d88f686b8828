//! netscan - a concurrent TCP port scanner
//!
//! Checks that a host is reachable, then probes its ports with a fixed-size
//! pool of workers and returns the open ones in ascending order.

pub mod config;
pub mod error;
pub mod intelligence;
pub mod network;
pub mod output;
pub mod scanner;
pub mod utils;

// Re-export commonly used types
pub use config::ScanConfig;
pub use error::ScanError;
pub use network::{probe_open, ProbeOutcome, Prober, TcpConnectProber};
pub use scanner::{
    concurrency, is_host_alive, scan_range, set_concurrency, Liveness, LivenessChecker,
    OpenPortSet, ScanEngine, ScanReport,
};

pub type Result<T> = std::result::Result<T, ScanError>;
