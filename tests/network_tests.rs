//! Real sockets on the loopback interface

use netscan::config::ScanConfig;
use netscan::network::{probe_open, EchoOutcome, ProbeOutcome, Prober, TcpConnectProber};
use netscan::scanner::{scan_range, LivenessChecker, ScanEngine};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn closed_port() -> u16 {
    let (_, port) = listener().await;
    port
}

#[tokio::test]
async fn test_probe_open_and_closed() {
    let (_listener, open) = listener().await;
    let closed = closed_port().await;

    assert!(probe_open("127.0.0.1", open, Duration::from_secs(1)).await);
    assert!(!probe_open("127.0.0.1", closed, Duration::from_secs(1)).await);
    assert_eq!(
        TcpConnectProber
            .probe("127.0.0.1", closed, Duration::from_secs(1))
            .await,
        ProbeOutcome::Refused
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_engine_finds_loopback_listeners() {
    let (_first, first) = listener().await;
    let (_second, second) = listener().await;
    let closed = closed_port().await;

    let engine = ScanEngine::new(
        TcpConnectProber,
        ScanConfig::default()
            .with_concurrency(4)
            .with_timeout(Duration::from_millis(500)),
    );
    let report = engine
        .scan_ports("127.0.0.1", &[second, closed, first])
        .await;

    let mut expected = vec![first, second];
    expected.sort_unstable();
    assert_eq!(report.open_ports.as_slice(), expected.as_slice());
    assert_eq!(report.counts.refused, 1);
}

#[tokio::test]
async fn test_compat_scan_range_on_single_port() {
    let (_listener, port) = listener().await;

    let open = scan_range("127.0.0.1", port, port).await;
    assert_eq!(open.as_slice(), &[port]);
}

#[tokio::test]
async fn test_liveness_with_real_prober() {
    struct NoEcho;

    #[async_trait::async_trait]
    impl netscan::network::EchoProbe for NoEcho {
        async fn echo(&self, _target: &str, _timeout: Duration) -> EchoOutcome {
            EchoOutcome::NoReply
        }
    }

    // Whatever loopback has open, the check must finish within the timeouts
    let checker = LivenessChecker::new(TcpConnectProber, NoEcho)
        .with_timeouts(Duration::from_millis(300), Duration::from_millis(300));
    let start = Instant::now();
    let _ = checker.check("127.0.0.1").await;
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_unresolvable_host_finds_nothing() {
    let engine = ScanEngine::new(
        TcpConnectProber,
        ScanConfig::default().with_timeout(Duration::from_millis(500)),
    );
    let report = engine
        .scan_ports("host.that.does.not.exist.invalid", &[80, 443])
        .await;

    assert!(report.open_ports.is_empty());
    assert_eq!(report.probed(), 2);
    assert_eq!(report.counts.open, 0);
}
