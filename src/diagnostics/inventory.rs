//! Host Inventory Diagnostic
//!
//! Samples static host facts once and dynamic facts every pass, and keeps
//! two pieces of per-pass state so vanished entities are written down to 0
//! instead of leaving stale series behind:
//!
//! - **Process watch state**: watch term → number of live processes whose
//!   name contains it. Counts reset every pass; a term left at zero gets its
//!   series set to 0 and stops being tracked until it reappears.
//! - **DNS snapshot**: servers seen last pass. A server missing from the
//!   current pass is set to 0, never deleted, so scrapes show the transition.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::names::{
    CPU_COUNT, DISK_AVAILABLE_BYTES, DISK_BYTES, DNS_ADDRESS, PROCESS_COUNT, PROCESS_EXECUTE,
    RAM_BYTES, UPTIME,
};
use super::{pause, Diagnostic};
use crate::config::InventorySettings;
use crate::domain::ports::{DiskUsage, HostFacts};
use crate::error::Result;
use crate::metrics::{MetricKind, MetricsRegistry};

const FAMILIES: &[(&str, &str, &[&str])] = &[
    (DNS_ADDRESS, "Computer DNS actual config", &["dns"]),
    (UPTIME, "Computer uptime", &[]),
    (PROCESS_COUNT, "Computer process count", &[]),
    (PROCESS_EXECUTE, "Computer process execute", &["process_name"]),
    (CPU_COUNT, "CPU count on workstation", &[]),
    (RAM_BYTES, "RAM bytes on workstation", &[]),
    (DISK_BYTES, "Storage bytes on workstation", &["device"]),
    (DISK_AVAILABLE_BYTES, "Storage avalable bytes on workstation", &["device"]),
];

/// One pass worth of host observations, gathered off the async runtime.
#[derive(Debug, Clone, Default)]
struct HostSample {
    process_names: Vec<String>,
    uptime_secs: u64,
    disks: Vec<DiskUsage>,
    dns: Vec<IpAddr>,
}

impl HostSample {
    fn collect(host: &dyn HostFacts) -> Self {
        Self {
            process_names: host.process_names(),
            uptime_secs: host.uptime_secs(),
            disks: host.fixed_disks(),
            dns: host.dns_servers(),
        }
    }
}

#[derive(Debug, Default)]
struct InventoryState {
    processes: HashMap<String, usize>,
    dns: Vec<IpAddr>,
}

/// Composite workstation diagnostic.
pub struct HostInventory {
    watch: Vec<String>,
    settings: InventorySettings,
    registry: Arc<MetricsRegistry>,
    host: Arc<dyn HostFacts>,
    state: Mutex<InventoryState>,
}

impl HostInventory {
    /// Create the diagnostic and register its metric families.
    ///
    /// Every watch term starts tracked, so a term that is not running at
    /// startup is written as 0 by the first pass.
    pub fn new(
        watch: Vec<String>,
        settings: &InventorySettings,
        registry: Arc<MetricsRegistry>,
        host: Arc<dyn HostFacts>,
    ) -> Result<Self> {
        for (name, help, labels) in FAMILIES {
            registry.create_series_family(name, help, labels, MetricKind::Gauge)?;
        }

        let mut unique: Vec<String> = Vec::with_capacity(watch.len());
        for term in watch {
            if !unique.contains(&term) {
                unique.push(term);
            }
        }
        let processes = unique.iter().map(|term| (term.clone(), 0)).collect();

        Ok(Self {
            watch: unique,
            settings: settings.clone(),
            registry,
            host,
            state: Mutex::new(InventoryState {
                processes,
                dns: Vec::new(),
            }),
        })
    }

    pub fn watch_terms(&self) -> &[String] {
        &self.watch
    }

    /// Watch terms currently tracked, sorted.
    pub fn tracked_processes(&self) -> Vec<String> {
        let mut terms: Vec<String> = self.state.lock().processes.keys().cloned().collect();
        terms.sort();
        terms
    }

    /// DNS servers recorded by the last pass.
    pub fn dns_snapshot(&self) -> Vec<IpAddr> {
        self.state.lock().dns.clone()
    }

    /// Publish facts that do not change while the agent runs.
    pub fn load_static(&self, cpu_count: usize, ram_bytes: u64, disks: &[DiskUsage]) {
        self.registry.set_gauge(CPU_COUNT, &[], cpu_count as f64);
        self.registry.set_gauge(RAM_BYTES, &[], ram_bytes as f64);
        for disk in disks {
            self.registry
                .set_gauge(DISK_BYTES, &[disk.device.as_str()], disk.total_bytes as f64);
        }
    }

    /// Publish uptime and free space.
    pub fn reload_dynamic(&self, uptime_secs: u64, disks: &[DiskUsage]) {
        self.registry.set_gauge(UPTIME, &[], uptime_secs as f64);
        for disk in disks {
            self.registry.set_gauge(
                DISK_AVAILABLE_BYTES,
                &[disk.device.as_str()],
                disk.available_bytes as f64,
            );
        }
    }

    /// Match live processes against the watch list.
    ///
    /// Returns the terms that vanished this pass (written 0 and untracked).
    pub fn reconcile_processes(&self, process_names: &[String]) -> Vec<String> {
        let mut state = self.state.lock();

        for count in state.processes.values_mut() {
            *count = 0;
        }
        for name in process_names {
            for term in &self.watch {
                if name.contains(term.as_str()) {
                    *state.processes.entry(term.clone()).or_insert(0) += 1;
                }
            }
        }

        self.registry
            .set_gauge(PROCESS_COUNT, &[], process_names.len() as f64);

        let mut vanished = Vec::new();
        state.processes.retain(|term, count| {
            if *count > 0 {
                self.registry.set_gauge(PROCESS_EXECUTE, &[term.as_str()], 1.0);
                true
            } else {
                self.registry.set_gauge(PROCESS_EXECUTE, &[term.as_str()], 0.0);
                vanished.push(term.clone());
                false
            }
        });

        vanished.sort();
        vanished
    }

    /// Diff the current DNS servers against the previous snapshot.
    ///
    /// IPv6 servers are ignored unless enabled. Returns the servers that
    /// dropped out this pass (written 0).
    pub fn reconcile_dns(&self, servers: &[IpAddr]) -> Vec<IpAddr> {
        let mut current: Vec<IpAddr> = Vec::with_capacity(servers.len());
        for ip in servers {
            if (ip.is_ipv4() || self.settings.ipv6_dns_enabled) && !current.contains(ip) {
                current.push(*ip);
            }
        }

        let mut state = self.state.lock();
        for ip in &current {
            self.registry.set_gauge(DNS_ADDRESS, &[&ip.to_string()], 1.0);
        }

        let removed: Vec<IpAddr> = state
            .dns
            .iter()
            .filter(|ip| !current.contains(ip))
            .copied()
            .collect();
        for ip in &removed {
            self.registry.set_gauge(DNS_ADDRESS, &[&ip.to_string()], 0.0);
        }

        state.dns = current;
        removed
    }

    async fn sample(&self) -> Option<HostSample> {
        let host = Arc::clone(&self.host);
        match tokio::task::spawn_blocking(move || HostSample::collect(host.as_ref())).await {
            Ok(sample) => Some(sample),
            Err(e) => {
                error!("Host sampling task failed: {}", e);
                None
            }
        }
    }

    /// Sample and publish static facts.
    pub async fn run_static(&self) {
        let host = Arc::clone(&self.host);
        let sampled = tokio::task::spawn_blocking(move || {
            (host.cpu_count(), host.total_memory_bytes(), host.fixed_disks())
        })
        .await;

        match sampled {
            Ok((cpus, ram, disks)) => {
                debug!(cpus, ram, disks = disks.len(), "Static host facts loaded");
                self.load_static(cpus, ram, &disks);
            }
            Err(e) => error!("Static host sampling failed: {}", e),
        }
    }

    /// One dynamic pass: processes, uptime and disks, DNS.
    #[instrument(skip(self))]
    pub async fn run_pass(&self) {
        let Some(sample) = self.sample().await else {
            return;
        };

        let vanished = self.reconcile_processes(&sample.process_names);
        self.reload_dynamic(sample.uptime_secs, &sample.disks);
        let removed = self.reconcile_dns(&sample.dns);

        debug!(
            processes = sample.process_names.len(),
            vanished = ?vanished,
            dns_removed = ?removed,
            "Inventory pass complete"
        );
    }
}

impl std::fmt::Debug for HostInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostInventory")
            .field("watch", &self.watch)
            .field("settings", &self.settings)
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[async_trait]
impl Diagnostic for HostInventory {
    fn name(&self) -> &'static str {
        "inventory"
    }

    async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting inventory diagnostic: {} watched processes every {:?}",
            self.watch.len(),
            self.settings.interval
        );

        self.run_static().await;

        while !cancel.is_cancelled() {
            self.run_pass().await;

            if !pause(self.settings.interval, &cancel).await {
                break;
            }
        }

        info!("Inventory diagnostic shutting down");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::diagnostics::testing::FakeHost;

    fn inventory(watch: &[&str], host: FakeHost) -> (HostInventory, Arc<MetricsRegistry>, Arc<FakeHost>) {
        inventory_with(watch, host, InventorySettings::default())
    }

    fn inventory_with(
        watch: &[&str],
        host: FakeHost,
        settings: InventorySettings,
    ) -> (HostInventory, Arc<MetricsRegistry>, Arc<FakeHost>) {
        let registry = Arc::new(MetricsRegistry::new());
        let host = Arc::new(host);
        let diagnostic = HostInventory::new(
            watch.iter().map(|w| w.to_string()).collect(),
            &settings,
            Arc::clone(&registry),
            host.clone(),
        )
        .unwrap();
        (diagnostic, registry, host)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_registers_all_families() {
        let (_, registry, _) = inventory(&[], FakeHost::default());

        for (name, _, _) in FAMILIES {
            assert!(registry.contains_family(name), "missing {}", name);
        }
    }

    #[test]
    fn test_process_reconciliation() {
        let (inv, registry, _) = inventory(&["csgo", "doka2"], FakeHost::default());

        let vanished = inv.reconcile_processes(&names(&["csgo.exe", "csgo.exe", "explorer.exe"]));

        assert_eq!(registry.gauge_value(PROCESS_EXECUTE, &["csgo"]), Some(1.0));
        assert_eq!(registry.gauge_value(PROCESS_EXECUTE, &["doka2"]), Some(0.0));
        assert_eq!(registry.gauge_value(PROCESS_COUNT, &[]), Some(3.0));
        assert_eq!(vanished, vec!["doka2".to_string()]);
        assert_eq!(inv.tracked_processes(), vec!["csgo".to_string()]);
    }

    #[test]
    fn test_process_exit_and_restart() {
        let (inv, registry, _) = inventory(&["nginx"], FakeHost::default());

        inv.reconcile_processes(&names(&["nginx", "nginx"]));
        assert_eq!(registry.gauge_value(PROCESS_EXECUTE, &["nginx"]), Some(1.0));

        let vanished = inv.reconcile_processes(&names(&["bash"]));
        assert_eq!(vanished, vec!["nginx".to_string()]);
        assert_eq!(registry.gauge_value(PROCESS_EXECUTE, &["nginx"]), Some(0.0));
        assert!(inv.tracked_processes().is_empty());

        // Untracked and still absent: no further transition
        assert!(inv.reconcile_processes(&names(&["bash"])).is_empty());

        inv.reconcile_processes(&names(&["nginx"]));
        assert_eq!(registry.gauge_value(PROCESS_EXECUTE, &["nginx"]), Some(1.0));
        assert_eq!(inv.tracked_processes(), vec!["nginx".to_string()]);
    }

    #[test]
    fn test_process_match_is_case_sensitive() {
        let (inv, registry, _) = inventory(&["Steam"], FakeHost::default());

        inv.reconcile_processes(&names(&["steam"]));
        assert_eq!(registry.gauge_value(PROCESS_EXECUTE, &["Steam"]), Some(0.0));
    }

    #[test]
    fn test_duplicate_watch_terms_collapse() {
        let (inv, _, _) = inventory(&["sshd", "sshd"], FakeHost::default());
        assert_eq!(inv.watch_terms(), &["sshd".to_string()]);
    }

    #[test]
    fn test_process_count_without_watch_list() {
        let (inv, registry, _) = inventory(&[], FakeHost::default());

        inv.reconcile_processes(&[]);
        assert_eq!(registry.gauge_value(PROCESS_COUNT, &[]), Some(0.0));
        assert_eq!(registry.series_count(PROCESS_EXECUTE), 0);
    }

    #[test]
    fn test_dns_transition() {
        let (inv, registry, _) = inventory(&[], FakeHost::default());

        inv.reconcile_dns(&[ip("1.1.1.1"), ip("8.8.8.8")]);
        let removed = inv.reconcile_dns(&[ip("8.8.8.8")]);

        assert_eq!(removed, vec![ip("1.1.1.1")]);
        assert_eq!(registry.gauge_value(DNS_ADDRESS, &["1.1.1.1"]), Some(0.0));
        assert_eq!(registry.gauge_value(DNS_ADDRESS, &["8.8.8.8"]), Some(1.0));
        assert_eq!(inv.dns_snapshot(), vec![ip("8.8.8.8")]);
    }

    #[test]
    fn test_dns_unchanged_does_not_flap() {
        let (inv, registry, _) = inventory(&[], FakeHost::default());
        let servers = [ip("1.1.1.1"), ip("8.8.8.8")];

        assert!(inv.reconcile_dns(&servers).is_empty());
        assert!(inv.reconcile_dns(&servers).is_empty());

        assert_eq!(registry.gauge_value(DNS_ADDRESS, &["1.1.1.1"]), Some(1.0));
        assert_eq!(registry.gauge_value(DNS_ADDRESS, &["8.8.8.8"]), Some(1.0));
        assert_eq!(registry.series_count(DNS_ADDRESS), 2);
    }

    #[test]
    fn test_dns_ipv6_filtered_by_default() {
        let (inv, registry, _) = inventory(&[], FakeHost::default());

        inv.reconcile_dns(&[ip("1.1.1.1"), ip("2606:4700:4700::1111")]);

        assert_eq!(inv.dns_snapshot(), vec![ip("1.1.1.1")]);
        assert_eq!(registry.gauge_value(DNS_ADDRESS, &["2606:4700:4700::1111"]), None);
    }

    #[test]
    fn test_dns_ipv6_enabled() {
        let settings = InventorySettings {
            ipv6_dns_enabled: true,
            ..Default::default()
        };
        let (inv, registry, _) = inventory_with(&[], FakeHost::default(), settings);

        inv.reconcile_dns(&[ip("2606:4700:4700::1111")]);
        assert_eq!(registry.gauge_value(DNS_ADDRESS, &["2606:4700:4700::1111"]), Some(1.0));
    }

    #[test]
    fn test_dns_empty_enumeration_zeroes_previous() {
        let (inv, registry, _) = inventory(&[], FakeHost::default());

        inv.reconcile_dns(&[ip("9.9.9.9")]);
        inv.reconcile_dns(&[]);

        assert_eq!(registry.gauge_value(DNS_ADDRESS, &["9.9.9.9"]), Some(0.0));
        assert!(inv.dns_snapshot().is_empty());
    }

    #[test]
    fn test_static_and_dynamic_facts() {
        let (inv, registry, _) = inventory(&[], FakeHost::default());
        let disks = vec![DiskUsage::new("/", 500_000, 120_000)];

        inv.load_static(8, 16_000_000_000, &disks);
        inv.reload_dynamic(3600, &disks);

        assert_eq!(registry.gauge_value(CPU_COUNT, &[]), Some(8.0));
        assert_eq!(registry.gauge_value(RAM_BYTES, &[]), Some(16_000_000_000.0));
        assert_eq!(registry.gauge_value(DISK_BYTES, &["/"]), Some(500_000.0));
        assert_eq!(registry.gauge_value(DISK_AVAILABLE_BYTES, &["/"]), Some(120_000.0));
        assert_eq!(registry.gauge_value(UPTIME, &[]), Some(3600.0));
    }

    #[tokio::test]
    async fn test_run_pass_samples_host() {
        let host = FakeHost {
            cpus: 4,
            memory: 8_000,
            ..Default::default()
        };
        host.set_processes(&["postgres", "postgres", "init"]);
        host.set_dns(&["1.1.1.1"]);
        *host.uptime.lock() = 120;
        *host.disks.lock() = vec![DiskUsage::new("/data", 1_000, 250)];

        let (inv, registry, _) = inventory(&["postgres"], host);
        inv.run_static().await;
        inv.run_pass().await;

        assert_eq!(registry.gauge_value(CPU_COUNT, &[]), Some(4.0));
        assert_eq!(registry.gauge_value(DISK_BYTES, &["/data"]), Some(1_000.0));
        assert_eq!(registry.gauge_value(DISK_AVAILABLE_BYTES, &["/data"]), Some(250.0));
        assert_eq!(registry.gauge_value(PROCESS_COUNT, &[]), Some(3.0));
        assert_eq!(registry.gauge_value(PROCESS_EXECUTE, &["postgres"]), Some(1.0));
        assert_eq!(registry.gauge_value(DNS_ADDRESS, &["1.1.1.1"]), Some(1.0));
        assert_eq!(registry.gauge_value(UPTIME, &[]), Some(120.0));
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn spawn(inv: &Arc<HostInventory>, cancel: &CancellationToken) -> tokio::task::JoinHandle<()> {
        let inv = Arc::clone(inv);
        let cancel = cancel.clone();
        tokio::spawn(async move { inv.run(cancel).await })
    }

    #[tokio::test]
    async fn test_run_reconciles_between_passes() {
        let host = FakeHost::default();
        host.set_dns(&["8.8.8.8"]);
        let settings = InventorySettings {
            interval: Duration::from_millis(20),
            ..Default::default()
        };
        let (inv, registry, host) = inventory_with(&["svc"], host, settings);
        let inv = Arc::new(inv);
        let cancel = CancellationToken::new();
        let task = spawn(&inv, &cancel);

        wait_for(|| registry.gauge_value(DNS_ADDRESS, &["8.8.8.8"]) == Some(1.0)).await;
        host.set_dns(&["9.9.9.9"]);
        wait_for(|| registry.gauge_value(DNS_ADDRESS, &["9.9.9.9"]) == Some(1.0)).await;

        cancel.cancel();
        task.await.unwrap();

        assert_eq!(registry.gauge_value(DNS_ADDRESS, &["8.8.8.8"]), Some(0.0));
        assert_eq!(registry.gauge_value(PROCESS_EXECUTE, &["svc"]), Some(0.0));
    }

    #[tokio::test]
    async fn test_run_honours_cancellation_during_sleep() {
        let settings = InventorySettings {
            interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let (inv, registry, _) = inventory_with(&[], FakeHost::default(), settings);
        let inv = Arc::new(inv);
        let cancel = CancellationToken::new();
        let task = spawn(&inv, &cancel);

        wait_for(|| registry.gauge_value(PROCESS_COUNT, &[]).is_some()).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("inventory loop ignored cancellation")
            .unwrap();
    }
}
