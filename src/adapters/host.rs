//! Host Facts Adapter
//!
//! Implements the `HostFacts` port with `sysinfo` for processes, disks,
//! CPU, memory and uptime, and the resolver configuration for DNS servers.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind,
    System,
};
use tracing::debug;

use crate::domain::ports::{DiskUsage, HostFacts};

/// Host facts read from the local machine.
pub struct SysinfoHost {
    system: Mutex<System>,
    disks: Mutex<Disks>,
    resolv_conf: PathBuf,
    upstream_resolv_conf: PathBuf,
}

/// Upstream servers written by systemd-resolved when resolv.conf points at
/// its local stub.
const SYSTEMD_RESOLV_CONF: &str = "/run/systemd/resolve/resolv.conf";

impl SysinfoHost {
    pub fn new(resolv_conf: impl Into<PathBuf>) -> Self {
        let refresh = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing())
            .with_memory(MemoryRefreshKind::nothing().with_ram());

        Self {
            system: Mutex::new(System::new_with_specifics(refresh)),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            resolv_conf: resolv_conf.into(),
            upstream_resolv_conf: PathBuf::from(SYSTEMD_RESOLV_CONF),
        }
    }

    /// Read upstream servers from `path` when resolv.conf only lists a
    /// loopback stub.
    pub fn with_upstream_resolv_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.upstream_resolv_conf = path.into();
        self
    }

    fn read_nameservers(path: &Path) -> Vec<IpAddr> {
        match std::fs::read_to_string(path) {
            Ok(text) => parse_resolv_conf(&text),
            Err(e) => {
                debug!(path = %path.display(), "Resolver configuration unreadable: {}", e);
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for SysinfoHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoHost")
            .field("resolv_conf", &self.resolv_conf)
            .finish()
    }
}

impl HostFacts for SysinfoHost {
    fn cpu_count(&self) -> usize {
        let count = self.system.lock().cpus().len();
        if count > 0 {
            count
        } else {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        }
    }

    fn total_memory_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        system.total_memory()
    }

    fn fixed_disks(&self) -> Vec<DiskUsage> {
        let mut disks = self.disks.lock();
        disks.refresh(true);

        disks
            .list()
            .iter()
            .filter(|disk| !disk.is_removable())
            .map(|disk| {
                DiskUsage::new(
                    disk.mount_point().to_string_lossy(),
                    disk.total_space(),
                    disk.available_space(),
                )
            })
            .collect()
    }

    fn process_names(&self) -> Vec<String> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::nothing());

        system
            .processes()
            .values()
            .map(|process| process.name().to_string_lossy().into_owned())
            .collect()
    }

    fn uptime_secs(&self) -> u64 {
        System::uptime()
    }

    fn dns_servers(&self) -> Vec<IpAddr> {
        let servers = Self::read_nameservers(&self.resolv_conf);
        if !is_local_stub(&servers) {
            return servers;
        }

        let upstream = Self::read_nameservers(&self.upstream_resolv_conf);
        if upstream.is_empty() {
            servers
        } else {
            debug!(
                path = %self.upstream_resolv_conf.display(),
                "Local resolver stub found, using upstream servers"
            );
            upstream
        }
    }
}

/// True when every listed server is a loopback stub such as 127.0.0.53.
fn is_local_stub(servers: &[IpAddr]) -> bool {
    !servers.is_empty() && servers.iter().all(IpAddr::is_loopback)
}

/// Nameserver addresses from resolv.conf content, in file order, deduplicated.
pub fn parse_resolv_conf(text: &str) -> Vec<IpAddr> {
    let mut servers: Vec<IpAddr> = Vec::new();

    for line in text.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("nameserver") {
            continue;
        }
        let Some(value) = fields.next() else {
            continue;
        };

        // Link-local IPv6 servers carry a zone suffix: fe80::1%eth0
        let address = value.split('%').next().unwrap_or(value);
        match address.parse::<IpAddr>() {
            Ok(ip) if !servers.contains(&ip) => servers.push(ip),
            Ok(_) => {}
            Err(_) => debug!(value, "Ignoring malformed nameserver entry"),
        }
    }

    servers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolv_conf() {
        let text = "\
# generated by NetworkManager
search lan
nameserver 1.1.1.1
nameserver 8.8.8.8
nameserver 1.1.1.1
nameserver fe80::1%eth0
nameserver bogus
options edns0
";
        let servers = parse_resolv_conf(text);

        assert_eq!(
            servers,
            vec![
                "1.1.1.1".parse::<IpAddr>().unwrap(),
                "8.8.8.8".parse().unwrap(),
                "fe80::1".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_missing_resolv_conf_is_empty() {
        let host = SysinfoHost::new("/nonexistent/resolv.conf");
        assert!(host.dns_servers().is_empty());
    }

    fn write_conf(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_stub_resolver_falls_back_to_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_conf(&dir, "resolv.conf", "nameserver 127.0.0.53\noptions edns0 trust-ad\n");
        let upstream = write_conf(&dir, "upstream.conf", "nameserver 192.168.1.1\nnameserver 9.9.9.9\n");

        let host = SysinfoHost::new(stub).with_upstream_resolv_conf(upstream);

        assert_eq!(
            host.dns_servers(),
            vec!["192.168.1.1".parse::<IpAddr>().unwrap(), "9.9.9.9".parse().unwrap()]
        );
    }

    #[test]
    fn test_stub_kept_without_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_conf(&dir, "resolv.conf", "nameserver 127.0.0.53\n");

        let host = SysinfoHost::new(stub).with_upstream_resolv_conf(dir.path().join("missing.conf"));

        assert_eq!(host.dns_servers(), vec!["127.0.0.53".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_real_servers_ignore_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let conf = write_conf(&dir, "resolv.conf", "nameserver 127.0.0.53\nnameserver 1.1.1.1\n");
        let upstream = write_conf(&dir, "upstream.conf", "nameserver 192.168.1.1\n");

        let host = SysinfoHost::new(conf).with_upstream_resolv_conf(upstream);

        assert_eq!(
            host.dns_servers(),
            vec!["127.0.0.53".parse::<IpAddr>().unwrap(), "1.1.1.1".parse().unwrap()]
        );
    }

    #[test]
    fn test_local_host_facts() {
        let host = SysinfoHost::new("/etc/resolv.conf");

        assert!(host.cpu_count() >= 1);
        assert!(!host.process_names().is_empty());
    }
}
