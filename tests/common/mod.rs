//! Instrumented stand-ins for the network used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use netscan::network::{EchoOutcome, EchoProbe, ProbeOutcome, Prober};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Prober that answers from a fixed set of open ports and records every call
#[derive(Default)]
pub struct StubProber {
    open: HashSet<u16>,
    latency: Duration,
    latencies: HashMap<u16, Duration>,
    calls: Mutex<HashMap<u16, usize>>,
    order: Mutex<Vec<u16>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StubProber {
    pub fn new(open: &[u16]) -> Self {
        Self {
            open: open.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Per-port latency, overriding the default one
    pub fn with_latencies(mut self, latencies: HashMap<u16, Duration>) -> Self {
        self.latencies = latencies;
        self
    }

    pub fn calls_for(&self, port: u16) -> usize {
        self.calls.lock().unwrap().get(&port).copied().unwrap_or(0)
    }

    pub fn call_counts(&self) -> HashMap<u16, usize> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Ports in the order they were probed
    pub fn call_order(&self) -> Vec<u16> {
        self.order.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for StubProber {
    async fn probe(&self, _target: &str, port: u16, _timeout: Duration) -> ProbeOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(port).or_insert(0) += 1;
        self.order.lock().unwrap().push(port);

        let latency = self.latencies.get(&port).copied().unwrap_or(self.latency);
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.open.contains(&port) {
            ProbeOutcome::Open
        } else {
            ProbeOutcome::Refused
        }
    }
}

/// Echo probe with a canned answer
pub struct StubEcho {
    outcome: EchoOutcome,
    calls: AtomicUsize,
}

impl StubEcho {
    pub fn new(outcome: EchoOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EchoProbe for StubEcho {
    async fn echo(&self, _target: &str, _timeout: Duration) -> EchoOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
