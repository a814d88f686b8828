//! Scanner module: worker pool, liveness gate and result collection

pub mod aggregator;
pub mod engine;
pub mod liveness;

use crate::config::ScanConfig;
use crate::intelligence::ServiceIdentity;
use crate::network::{IcmpEcho, TcpConnectProber};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use aggregator::{AggregateSummary, OpenPortSet, OutcomeCounts, ResultAggregator};
pub use engine::ScanEngine;
pub use liveness::{Liveness, LivenessChecker, LIVENESS_PORTS};

/// Worker count used until [`set_concurrency`] says otherwise
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Upper bound on the worker count, one worker per possible port
pub const MAX_CONCURRENCY: usize = 65535;

static CONCURRENCY: AtomicUsize = AtomicUsize::new(DEFAULT_CONCURRENCY);

/// Set the process-wide default worker count.
///
/// Zero, negative and values above [`MAX_CONCURRENCY`] are ignored. Scans
/// already running keep the count they started with.
pub fn set_concurrency(n: i64) {
    if n <= 0 {
        log::debug!("Ignoring non-positive concurrency {}", n);
        return;
    }

    match usize::try_from(n) {
        Ok(n) if n <= MAX_CONCURRENCY => CONCURRENCY.store(n, Ordering::SeqCst),
        _ => log::debug!("Ignoring out of range concurrency {}", n),
    }
}

/// Current process-wide default worker count
pub fn concurrency() -> usize {
    CONCURRENCY.load(Ordering::SeqCst)
}

/// One port to probe against a fixed target
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub target: Arc<str>,
    pub port: u16,
    pub timeout: Duration,
}

/// Everything known about one finished scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Target that was scanned
    pub target: String,

    /// Open ports, ascending
    pub open_ports: OpenPortSet,

    /// Distinct ports queued for probing
    pub requested: usize,

    #[serde(flatten)]
    pub counts: OutcomeCounts,

    /// The scan stopped before every queued port was probed
    pub cancelled: bool,

    pub duration: Duration,

    pub started_at: DateTime<Utc>,

    /// Number of workers spawned, never more than there were ports
    pub concurrency: usize,

    /// Identified services keyed by port
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<u16, ServiceIdentity>,
}

impl ScanReport {
    /// Ports actually probed
    pub fn probed(&self) -> usize {
        self.counts.probed
    }

    /// Get scan rate in ports per second
    pub fn scan_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.counts.probed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.counts.probed == self.requested
    }
}

/// Scan `start..=end` on `host` with the process-wide worker count and the
/// default 2 second per-port timeout
pub async fn scan_range(host: &str, start: u16, end: u16) -> OpenPortSet {
    ScanEngine::new(TcpConnectProber, ScanConfig::current())
        .scan_range(host, start, end)
        .await
}

/// Whether `host` answers on 80, 443 or 22, or to an ICMP echo
pub async fn is_host_alive(host: &str) -> bool {
    LivenessChecker::new(TcpConnectProber, IcmpEcho)
        .is_alive(host)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(probed: usize, requested: usize, cancelled: bool) -> ScanReport {
        ScanReport {
            target: "host".to_string(),
            open_ports: OpenPortSet::from(vec![443, 22]),
            requested,
            counts: OutcomeCounts {
                probed,
                open: 2,
                refused: probed.saturating_sub(2),
                ..Default::default()
            },
            cancelled,
            duration: Duration::from_secs(2),
            started_at: Utc::now(),
            concurrency: 20,
            services: BTreeMap::new(),
        }
    }

    #[test]
    fn test_scan_rate() {
        let complete = report(100, 100, false);
        assert_eq!(complete.probed(), 100);
        assert!((complete.scan_rate() - 50.0).abs() < f64::EPSILON);
        assert!(complete.is_complete());
        assert!(!report(40, 100, true).is_complete());
    }

    #[test]
    fn test_report_json() {
        let json = serde_json::to_value(report(10, 10, false)).unwrap();
        assert_eq!(json["target"], "host");
        assert_eq!(json["open_ports"], serde_json::json!([22, 443]));
        assert_eq!(json["probed"], 10);
        assert_eq!(json["refused"], 8);
        assert!(json.get("services").is_none());
    }
}
