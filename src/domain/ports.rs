//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions over the OS and network facilities the diagnostics depend
//! on. Infrastructure adapters implement these traits; tests substitute
//! in-memory fakes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Diagnostics                             │
//! │      NetworkPing  │  HttpProbe  │  HostInventory             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Ports (Traits)                            │
//! │      EchoProber   │  HttpFetcher │  HostFacts                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Adapters (Impls)                           │
//! │     IcmpProber    │ ReqwestFetcher │ SysinfoHost             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

// =============================================================================
// Echo (ping) Port
// =============================================================================

/// Result of one echo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// Reply received within the timeout
    Success(Duration),
    /// No reply before the timeout
    Timeout,
    /// Target could not be resolved or routed
    Unreachable,
    /// Local failure (socket creation, permissions)
    Error,
}

impl PingOutcome {
    /// Status label written to `ping_result_status`.
    pub fn status_code(&self) -> &'static str {
        match self {
            PingOutcome::Success(_) => "success",
            PingOutcome::Timeout => "timeout",
            PingOutcome::Unreachable => "unreachable",
            PingOutcome::Error => "error",
        }
    }

    pub fn round_trip(&self) -> Option<Duration> {
        match self {
            PingOutcome::Success(rtt) => Some(*rtt),
            _ => None,
        }
    }
}

/// Port for ICMP echo requests.
#[async_trait]
pub trait EchoProber: Send + Sync {
    /// Send one echo request to `target` (hostname or IP literal).
    ///
    /// Never fails: every failure mode is a [`PingOutcome`] variant.
    async fn echo(&self, target: &str, payload: &[u8], timeout: Duration) -> PingOutcome;
}

// =============================================================================
// HTTP Port
// =============================================================================

/// Result of one GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpOutcome {
    /// A response arrived, whatever its status
    Response(u16),
    /// The request failed in a modelled way (timeout, connect failure).
    /// Carries the HTTP status when the failure had one.
    Failed(Option<u16>),
    /// Any other client error; logged, never recorded
    Dropped(String),
}

/// Synthetic status recorded when a failed request carried no status.
pub const REQUEST_TIMEOUT_STATUS: u16 = 408;

impl HttpOutcome {
    /// Status label written to `http_result_status`, if this outcome is recorded.
    pub fn status_code(&self) -> Option<String> {
        match self {
            HttpOutcome::Response(status) => Some(status.to_string()),
            HttpOutcome::Failed(status) => {
                Some(status.unwrap_or(REQUEST_TIMEOUT_STATUS).to_string())
            }
            HttpOutcome::Dropped(_) => None,
        }
    }
}

/// Port for HTTP GET requests.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str) -> HttpOutcome;
}

// =============================================================================
// Host Facts Port
// =============================================================================

/// Capacity and free space of one fixed disk volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    /// Volume identifier used as the `device` label (mount point)
    pub device: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    pub fn new(device: impl Into<String>, total_bytes: u64, available_bytes: u64) -> Self {
        Self {
            device: device.into(),
            total_bytes,
            available_bytes,
        }
    }
}

/// Port for sampling static and dynamic facts about the local host.
///
/// Calls are synchronous and may block on `/proc` or filesystem reads; the
/// inventory diagnostic runs them off the async runtime.
pub trait HostFacts: Send + Sync {
    /// Number of logical CPUs.
    fn cpu_count(&self) -> usize;

    /// Installed RAM in bytes.
    fn total_memory_bytes(&self) -> u64;

    /// Fixed (non-removable) disk volumes.
    fn fixed_disks(&self) -> Vec<DiskUsage>;

    /// Names of every live process, one entry per process.
    fn process_names(&self) -> Vec<String>;

    /// Seconds since boot.
    fn uptime_secs(&self) -> u64;

    /// DNS servers configured on active interfaces. Empty when unknown.
    fn dns_servers(&self) -> Vec<IpAddr>;
}
