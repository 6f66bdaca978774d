//! Network link trait and the TCP reachability implementation

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// A network attachment that can be brought up
#[async_trait]
pub trait NetworkLink: Send + Sync {
    /// One attach attempt, returning the acquired local address
    async fn attach(&self) -> Result<IpAddr>;

    /// Resolves with a reason once an established link drops
    async fn wait_lost(&self) -> String {
        std::future::pending().await
    }

    /// Human-readable name for this link
    fn name(&self) -> &str;
}

/// Treats the link as attached once a probe address accepts a TCP connection
///
/// The local address of the probe connection is reported as the acquired
/// address. When `watch_interval` is set, the probe is repeated to detect
/// link loss.
pub struct TcpProbeLink {
    name: String,
    probe_addr: String,
    attach_timeout: Duration,
    watch_interval: Option<Duration>,
}

impl TcpProbeLink {
    pub fn new(name: impl Into<String>, probe_addr: impl Into<String>, attach_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            probe_addr: probe_addr.into(),
            attach_timeout,
            watch_interval: None,
        }
    }

    /// Re-probe every `interval` once attached
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = Some(interval);
        self
    }

    async fn probe(&self) -> Result<IpAddr> {
        match timeout(self.attach_timeout, TcpStream::connect(&self.probe_addr)).await {
            Ok(Ok(stream)) => Ok(stream.local_addr()?.ip()),
            Ok(Err(e)) => Err(anyhow!("{} unreachable: {}", self.probe_addr, e)),
            Err(_) => Err(anyhow!(
                "{} did not answer within {:?}",
                self.probe_addr,
                self.attach_timeout
            )),
        }
    }
}

#[async_trait]
impl NetworkLink for TcpProbeLink {
    async fn attach(&self) -> Result<IpAddr> {
        self.probe().await
    }

    async fn wait_lost(&self) -> String {
        let Some(interval) = self.watch_interval else {
            return std::future::pending().await;
        };

        loop {
            tokio::time::sleep(interval).await;
            match self.probe().await {
                Ok(addr) => debug!("[NET] {} still up ({})", self.name, addr),
                Err(e) => return e.to_string(),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_attach_reports_local_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let link = TcpProbeLink::new("lan", addr.to_string(), Duration::from_secs(1));
        let ip = link.attach().await.unwrap();
        assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(link.name(), "lan");
    }

    #[tokio::test]
    async fn test_attach_fails_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let link = TcpProbeLink::new("lan", addr.to_string(), Duration::from_secs(1));
        assert!(link.attach().await.is_err());
    }

    #[tokio::test]
    async fn test_wait_lost_detects_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let link = TcpProbeLink::new("lan", addr.to_string(), Duration::from_secs(1))
            .with_watch_interval(Duration::from_millis(10));
        link.attach().await.unwrap();
        drop(listener);

        let reason = timeout(Duration::from_secs(5), link.wait_lost())
            .await
            .unwrap();
        assert!(reason.contains("unreachable"));
    }
}
