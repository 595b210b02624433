//! Host device conditions for background jobs
//!
//! Network availability is probed with a TCP connect to the API host.
//! Idleness compares the 1-minute load average from `/proc/loadavg` with
//! the number of available CPUs.

use std::path::PathBuf;
use std::time::Duration;

use daybook_core::ports::IDeviceConditions;
use tracing::debug;

const LOADAVG_PATH: &str = "/proc/loadavg";

/// [`IDeviceConditions`] backed by the local host
pub struct HostConditions {
    /// `host:port` probed for connectivity; `None` means always offline
    probe_addr: Option<String>,
    probe_timeout: Duration,
    loadavg_path: PathBuf,
    cpus: f64,
}

impl HostConditions {
    pub fn new(api_base_url: &str, probe_timeout: Duration) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1) as f64;
        Self {
            probe_addr: probe_address(api_base_url),
            probe_timeout,
            loadavg_path: PathBuf::from(LOADAVG_PATH),
            cpus,
        }
    }

    #[cfg(test)]
    fn with_loadavg(mut self, path: PathBuf, cpus: f64) -> Self {
        self.loadavg_path = path;
        self.cpus = cpus;
        self
    }
}

#[async_trait::async_trait]
impl IDeviceConditions for HostConditions {
    async fn is_network_connected(&self) -> bool {
        let Some(addr) = &self.probe_addr else {
            return false;
        };
        match tokio::time::timeout(self.probe_timeout, tokio::net::TcpStream::connect(addr)).await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr = %addr, error = %e, "Network check failed");
                false
            }
            Err(_) => {
                debug!(addr = %addr, "Network check timed out");
                false
            }
        }
    }

    async fn is_device_idle(&self) -> bool {
        match tokio::fs::read_to_string(&self.loadavg_path).await {
            Ok(content) => match parse_load(&content) {
                Some(load) => load < self.cpus,
                None => true,
            },
            // No load information (non-Linux): treat as idle
            Err(_) => true,
        }
    }
}

/// `host:port` for a base URL, defaulting the port from the scheme
fn probe_address(base_url: &str) -> Option<String> {
    let url = reqwest::Url::parse(base_url).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{host}:{port}"))
}

/// First field of `/proc/loadavg`
fn parse_load(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}
