//! Thread-safe collection of probe results

use crate::network::{ProbeOutcome, ProbeResult};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Ports that answered as open, strictly ascending and without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<u16>", into = "Vec<u16>")]
pub struct OpenPortSet(Vec<u16>);

impl OpenPortSet {
    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.0.binary_search(&port).is_ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, u16> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<u16> {
        self.0
    }
}

impl From<Vec<u16>> for OpenPortSet {
    fn from(mut ports: Vec<u16>) -> Self {
        ports.sort_unstable();
        ports.dedup();
        Self(ports)
    }
}

impl From<OpenPortSet> for Vec<u16> {
    fn from(set: OpenPortSet) -> Self {
        set.0
    }
}

impl IntoIterator for OpenPortSet {
    type Item = u16;
    type IntoIter = std::vec::IntoIter<u16>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a OpenPortSet {
    type Item = &'a u16;
    type IntoIter = std::slice::Iter<'a, u16>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// How many probes ended in each outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub probed: usize,
    pub open: usize,
    pub refused: usize,
    pub timed_out: usize,
    pub resolution_failed: usize,
    pub unreachable: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: ProbeOutcome) {
        self.probed += 1;
        match outcome {
            ProbeOutcome::Open => self.open += 1,
            ProbeOutcome::Refused => self.refused += 1,
            ProbeOutcome::TimedOut => self.timed_out += 1,
            ProbeOutcome::ResolutionFailed => self.resolution_failed += 1,
            ProbeOutcome::Unreachable => self.unreachable += 1,
        }
    }

    /// Probes that did not find an open port
    pub fn closed(&self) -> usize {
        self.probed.saturating_sub(self.open)
    }
}

#[derive(Debug, Default)]
struct Collected {
    open: Vec<u16>,
    counts: OutcomeCounts,
}

/// Final state of an aggregator once every worker is done
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateSummary {
    pub open_ports: OpenPortSet,
    pub counts: OutcomeCounts,
}

/// Sink shared by all workers of one scan.
///
/// Appends happen in arrival order under a single lock. Sorting only
/// happens in [`ResultAggregator::into_summary`], which takes the
/// aggregator by value and therefore cannot run while workers still
/// hold a reference to it.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    inner: Mutex<Collected>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one probe result
    pub async fn record(&self, result: ProbeResult) {
        let mut collected = self.inner.lock().await;
        collected.counts.record(result.outcome);
        if result.is_open() {
            collected.open.push(result.port);
        }
    }

    /// Copy of what has been collected so far
    pub async fn snapshot(&self) -> AggregateSummary {
        let collected = self.inner.lock().await;
        AggregateSummary {
            open_ports: OpenPortSet::from(collected.open.clone()),
            counts: collected.counts,
        }
    }

    pub fn into_summary(self) -> AggregateSummary {
        let collected = self.inner.into_inner();
        AggregateSummary {
            open_ports: OpenPortSet::from(collected.open),
            counts: collected.counts,
        }
    }

    pub fn into_open_ports(self) -> OpenPortSet {
        self.into_summary().open_ports
    }
}
