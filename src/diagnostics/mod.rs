//! Diagnostics
//!
//! Independently scheduled polling routines. Each diagnostic owns its target
//! list, its tracking state and a fixed set of metric families, and loops
//! until its cancellation token fires.
//!
//! # Components
//!
//! - **NetworkPing** (`ping.rs`): ICMP echo round-trip time and outcome per target
//! - **HttpProbe** (`http.rs`): GET latency and status per URL host
//! - **HostInventory** (`inventory.rs`): CPU, RAM, disks, uptime, watched
//!   processes and DNS servers, with reconciliation of vanished entities
//!
//! Per-target failures never leave a diagnostic: they become metric writes.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

mod http;
mod inventory;
mod ping;

#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpProbe;
pub use inventory::HostInventory;
pub use ping::NetworkPing;

/// Exported metric family names.
pub mod names {
    pub const PING_RESULT_MS: &str = "ping_result_ms";
    pub const PING_RESULT_STATUS: &str = "ping_result_status";
    pub const HTTP_RESULT_MS: &str = "http_result_ms";
    pub const HTTP_RESULT_STATUS: &str = "http_result_status";
    pub const DNS_ADDRESS: &str = "workstation_dns_address";
    pub const UPTIME: &str = "workstation_uptime";
    pub const PROCESS_COUNT: &str = "workstation_process_count";
    pub const PROCESS_EXECUTE: &str = "workstation_process_execute";
    pub const CPU_COUNT: &str = "workstation_cpu_count";
    pub const RAM_BYTES: &str = "workstation_ram_bytes";
    pub const DISK_BYTES: &str = "workstation_disk_bytes";
    pub const DISK_AVAILABLE_BYTES: &str = "workstation_disk_avalable_bytes";
}

/// A long-running polling routine.
#[async_trait]
pub trait Diagnostic: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Poll until `cancel` fires. Returns once the current pass has been
    /// abandoned or finished.
    async fn run(&self, cancel: CancellationToken);
}

/// Sleep for `period`, waking early on cancellation.
///
/// Returns `false` if cancelled.
pub(crate) async fn pause(period: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}
