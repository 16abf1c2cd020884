//! In-memory port fakes for diagnostic tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::ports::{DiskUsage, EchoProber, HostFacts, HttpFetcher, HttpOutcome, PingOutcome};

/// Prober answering from a fixed table; unknown targets time out.
#[derive(Default)]
pub struct FakeProber {
    outcomes: HashMap<String, PingOutcome>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeProber {
    pub fn with(mut self, target: &str, outcome: PingOutcome) -> Self {
        self.outcomes.insert(target.to_string(), outcome);
        self
    }
}

#[async_trait]
impl EchoProber for FakeProber {
    async fn echo(&self, target: &str, _payload: &[u8], _timeout: Duration) -> PingOutcome {
        self.calls.lock().push(target.to_string());
        self.outcomes
            .get(target)
            .copied()
            .unwrap_or(PingOutcome::Timeout)
    }
}

/// Fetcher answering from a fixed table; unknown URLs fail without status.
#[derive(Default)]
pub struct FakeFetcher {
    outcomes: HashMap<String, HttpOutcome>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn with(mut self, url: &str, outcome: HttpOutcome) -> Self {
        self.outcomes.insert(url.to_string(), outcome);
        self
    }
}

#[async_trait]
impl HttpFetcher for FakeFetcher {
    async fn get(&self, url: &str) -> HttpOutcome {
        self.calls.lock().push(url.to_string());
        self.outcomes
            .get(url)
            .cloned()
            .unwrap_or(HttpOutcome::Failed(None))
    }
}

/// Host whose facts are set by the test between passes.
#[derive(Default)]
pub struct FakeHost {
    pub cpus: usize,
    pub memory: u64,
    pub disks: Mutex<Vec<DiskUsage>>,
    pub processes: Mutex<Vec<String>>,
    pub uptime: Mutex<u64>,
    pub dns: Mutex<Vec<IpAddr>>,
}

impl FakeHost {
    pub fn set_processes(&self, names: &[&str]) {
        *self.processes.lock() = names.iter().map(|n| n.to_string()).collect();
    }

    pub fn set_dns(&self, servers: &[&str]) {
        *self.dns.lock() = servers.iter().map(|s| s.parse().unwrap()).collect();
    }
}

impl HostFacts for FakeHost {
    fn cpu_count(&self) -> usize {
        self.cpus
    }

    fn total_memory_bytes(&self) -> u64 {
        self.memory
    }

    fn fixed_disks(&self) -> Vec<DiskUsage> {
        self.disks.lock().clone()
    }

    fn process_names(&self) -> Vec<String> {
        self.processes.lock().clone()
    }

    fn uptime_secs(&self) -> u64 {
        *self.uptime.lock()
    }

    fn dns_servers(&self) -> Vec<IpAddr> {
        self.dns.lock().clone()
    }
}
