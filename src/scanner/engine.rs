//! Worker-pool scan engine

use crate::config::ScanConfig;
use crate::network::{ProbeResult, Prober};
use crate::scanner::aggregator::{OpenPortSet, ResultAggregator};
use crate::scanner::{ScanJob, ScanReport};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

type JobQueue = Arc<Mutex<mpsc::Receiver<ScanJob>>>;

/// Scans the ports of one target with a fixed number of workers
pub struct ScanEngine<P> {
    prober: Arc<P>,
    config: ScanConfig,
}

impl<P: Prober + 'static> ScanEngine<P> {
    pub fn new(prober: P, config: ScanConfig) -> Self {
        Self::from_shared(Arc::new(prober), config)
    }

    /// Build an engine around a prober the caller keeps a handle to
    pub fn from_shared(prober: Arc<P>, config: ScanConfig) -> Self {
        Self { prober, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Probe every port in `start..=end` and return the open ones.
    ///
    /// An inverted range yields an empty set.
    pub async fn scan_range(&self, target: &str, start: u16, end: u16) -> OpenPortSet {
        if start > end {
            log::warn!("Empty port range {}-{} for {}", start, end, target);
            return OpenPortSet::default();
        }

        let ports: Vec<u16> = (start..=end).collect();
        self.scan_ports(target, &ports).await.open_ports
    }

    /// Probe an explicit list of ports. Duplicates are probed once.
    pub async fn scan_ports(&self, target: &str, ports: &[u16]) -> ScanReport {
        self.scan_with_cancel(target, ports, CancellationToken::new())
            .await
    }

    /// Probe `ports` until the queue is drained or `cancel` fires.
    ///
    /// Workers look at the token before taking each job, so probes already
    /// in flight finish and keep their results.
    pub async fn scan_with_cancel(
        &self,
        target: &str,
        ports: &[u16],
        cancel: CancellationToken,
    ) -> ScanReport {
        let started_at = Utc::now();
        let start_time = Instant::now();

        let mut ports: Vec<u16> = ports.iter().copied().filter(|&port| port != 0).collect();
        ports.sort_unstable();
        ports.dedup();

        let requested = ports.len();
        // Spare workers would find the queue empty and exit at once
        let concurrency = self.config.concurrency.clamp(1, requested.max(1));
        let mut report = ScanReport {
            target: target.to_string(),
            open_ports: OpenPortSet::default(),
            requested,
            counts: Default::default(),
            cancelled: false,
            duration: Default::default(),
            started_at,
            concurrency,
            services: BTreeMap::new(),
        };

        if requested == 0 {
            log::debug!("No ports to scan on {}", target);
            return report;
        }

        log::debug!(
            "Scanning {} ports on {} with {} workers",
            requested,
            target,
            concurrency
        );

        let queue = self.fill_queue(target, ports);
        let aggregator = Arc::new(ResultAggregator::new());

        let mut handles = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            handles.push(tokio::spawn(run_worker(
                self.prober.clone(),
                queue.clone(),
                aggregator.clone(),
                cancel.clone(),
            )));
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                log::error!("Scan worker failed: {}", e);
            }
        }

        let summary = match Arc::try_unwrap(aggregator) {
            Ok(aggregator) => aggregator.into_summary(),
            Err(shared) => shared.snapshot().await,
        };

        report.open_ports = summary.open_ports;
        report.counts = summary.counts;
        report.cancelled = report.counts.probed < requested;
        report.duration = start_time.elapsed();

        if report.cancelled {
            log::warn!(
                "Scan of {} cancelled after {}/{} ports",
                target,
                report.counts.probed,
                requested
            );
        } else {
            log::debug!(
                "Scan of {} finished in {:.2}s: {} open",
                target,
                report.duration.as_secs_f64(),
                report.open_ports.len()
            );
        }

        report
    }

    /// Queue every job up front; capacity matches the job count so no send waits
    fn fill_queue(&self, target: &str, ports: Vec<u16>) -> JobQueue {
        let target: Arc<str> = Arc::from(target);
        let timeout = self.config.timeout_duration();
        let (tx, rx) = mpsc::channel(ports.len());

        for port in ports {
            let job = ScanJob {
                target: target.clone(),
                port,
                timeout,
            };
            if tx.try_send(job).is_err() {
                log::error!("Job queue rejected port {}", port);
            }
        }

        Arc::new(Mutex::new(rx))
    }
}

async fn run_worker<P: Prober>(
    prober: Arc<P>,
    queue: JobQueue,
    aggregator: Arc<ResultAggregator>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        // The sender is gone, so recv never waits on an empty queue
        let job = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };

        let job = match job {
            Some(job) => job,
            None => break,
        };

        let outcome = prober.probe(&job.target, job.port, job.timeout).await;
        aggregator.record(ProbeResult::new(job.port, outcome)).await;
    }
}
