//! Banner grabbing and signature matching for open ports

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const HTTP_PROBE: &[u8] = b"HEAD / HTTP/1.0\r\n\r\n";
const BANNER_BUFFER_LEN: usize = 4096;

/// How long to wait for a server that talks first (SSH, FTP, SMTP)
const GREETING_WAIT: Duration = Duration::from_millis(500);

/// Ports where the client has to speak first with an HTTP request
pub const HTTP_PORTS: &[u16] = &[80, 81, 591, 8000, 8008, 8080, 8081, 8888];

/// Software identified on a port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub protocol: String,
    pub product: String,
    pub version: String,
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.protocol, self.product, self.version)
    }
}

/// One known response pattern. The first capture group is the version.
pub struct ServiceSignature {
    pub protocol: &'static str,
    pub product: &'static str,
    pub pattern: Regex,
}

impl ServiceSignature {
    fn new(protocol: &'static str, product: &'static str, pattern: &str) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(pattern) => Some(Self {
                protocol,
                product,
                pattern,
            }),
            Err(e) => {
                log::error!("Invalid signature for {}: {}", product, e);
                None
            }
        }
    }

    fn identify(&self, banner: &str) -> Option<ServiceIdentity> {
        let captures = self.pattern.captures(banner)?;
        let version = captures.get(1).map(|m| m.as_str()).unwrap_or_default();

        Some(ServiceIdentity {
            protocol: self.protocol.to_string(),
            product: self.product.to_string(),
            version: version.to_string(),
        })
    }
}

static SIGNATURES: Lazy<Vec<ServiceSignature>> = Lazy::new(|| {
    [
        ("http", "Apache", r"Server: Apache/(\d+\.\d+\.\d+)"),
        ("http", "Nginx", r"Server: nginx/(\d+\.\d+\.\d+)"),
        ("ssh", "OpenSSH", r"SSH-2.0-OpenSSH_(\d+\.\d+)"),
    ]
    .into_iter()
    .filter_map(|(protocol, product, pattern)| ServiceSignature::new(protocol, product, pattern))
    .collect()
});

/// The loaded signature table
pub fn signatures() -> &'static [ServiceSignature] {
    &SIGNATURES
}

/// Match a raw response against the signature table
pub fn match_banner(banner: &str) -> Option<ServiceIdentity> {
    SIGNATURES.iter().find_map(|signature| signature.identify(banner))
}

#[async_trait]
pub trait ServiceIdentifier: Send + Sync {
    async fn identify_service(&self, target: &str, port: u16) -> Option<ServiceIdentity>;
}

/// Connects, collects whatever the service says and matches it
#[derive(Debug, Clone)]
pub struct BannerGrabber {
    timeout: Duration,
}

impl BannerGrabber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Read the first response chunk from `target:port`.
    ///
    /// HTTP ports get a `HEAD` request straight away. Other ports get a short
    /// window to send a greeting before the `HEAD` request goes out.
    pub async fn grab_banner(&self, target: &str, port: u16) -> Option<String> {
        let host = target.trim_start_matches('[').trim_end_matches(']');

        let result = timeout(self.timeout, async {
            let mut stream = TcpStream::connect((host, port)).await.ok()?;
            let mut buffer = vec![0u8; BANNER_BUFFER_LEN];

            if !HTTP_PORTS.contains(&port) {
                if let Ok(Ok(n)) = timeout(GREETING_WAIT, stream.read(&mut buffer)).await {
                    if n > 0 {
                        return Some(String::from_utf8_lossy(&buffer[..n]).into_owned());
                    }
                }
            }

            stream.write_all(HTTP_PROBE).await.ok()?;
            let n = stream.read(&mut buffer).await.ok()?;
            if n == 0 {
                return None;
            }
            Some(String::from_utf8_lossy(&buffer[..n]).into_owned())
        })
        .await;

        match result {
            Ok(banner) => banner,
            Err(_) => {
                log::debug!("Banner grab from {}:{} timed out", target, port);
                None
            }
        }
    }
}

#[async_trait]
impl ServiceIdentifier for BannerGrabber {
    async fn identify_service(&self, target: &str, port: u16) -> Option<ServiceIdentity> {
        let banner = self.grab_banner(target, port).await?;
        let identity = match_banner(&banner);

        match &identity {
            Some(identity) => log::debug!("{}:{} identified as {}", target, port, identity),
            None => log::debug!("{}:{} sent an unrecognised banner", target, port),
        }
        identity
    }
}

/// Identify the services on `ports`, keeping at most `limit` lookups in flight.
///
/// Once `cancel` fires no further port is started and lookups still running
/// are dropped; what finished before that is returned.
pub async fn identify_services<I>(
    identifier: &I,
    target: &str,
    ports: &[u16],
    limit: usize,
    cancel: &CancellationToken,
) -> BTreeMap<u16, ServiceIdentity>
where
    I: ServiceIdentifier + ?Sized,
{
    if cancel.is_cancelled() {
        return BTreeMap::new();
    }

    stream::iter(ports.iter().copied())
        .map(|port| async move { (port, identifier.identify_service(target, port).await) })
        .buffer_unordered(limit.max(1))
        .take_until(cancel.cancelled())
        .filter_map(|(port, identity)| async move { identity.map(|identity| (port, identity)) })
        .collect()
        .await
}
