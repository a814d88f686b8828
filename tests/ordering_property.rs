//! The open port list is ascending and duplicate-free whatever order the
//! probes finish in

mod common;

use common::StubProber;
use netscan::config::ScanConfig;
use netscan::scanner::ScanEngine;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn open_ports_sorted_under_shuffled_latency(
        open in prop::collection::btree_set(1u16..=200, 0..40),
        delays in prop::collection::vec(0u64..4, 200),
        concurrency in 1usize..16,
    ) {
        let latencies: HashMap<u16, Duration> = delays
            .iter()
            .enumerate()
            .map(|(i, ms)| (i as u16 + 1, Duration::from_millis(*ms)))
            .collect();
        let open_list: Vec<u16> = open.iter().copied().collect();

        let prober = Arc::new(StubProber::new(&open_list).with_latencies(latencies));
        let engine = ScanEngine::from_shared(
            prober.clone(),
            ScanConfig::default().with_concurrency(concurrency),
        );

        let found = tokio_test::block_on(engine.scan_range("stub", 1, 200));

        prop_assert!(found.as_slice().windows(2).all(|pair| pair[0] < pair[1]));
        let found_set: BTreeSet<u16> = found.iter().copied().collect();
        prop_assert_eq!(found_set, open);
        prop_assert_eq!(prober.total_calls(), 200);
    }
}
