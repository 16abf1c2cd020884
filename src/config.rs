//! Agent configuration
//!
//! Runtime tunables and the loaders that turn target files into plain lists.
//! Settings are built once in `main` and handed to each component; nothing
//! reads them through a global.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Settings
// =============================================================================

/// Largest ICMP echo payload that fits in one IPv4 datagram
pub const MAX_PING_PAYLOAD: usize = 65_507;

/// Ping diagnostic settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingSettings {
    /// Delay between passes
    #[serde(with = "secs")]
    pub interval: Duration,
    /// Per-echo timeout
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// Echo payload size in bytes
    pub payload_size: usize,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            timeout: Duration::from_secs(5),
            payload_size: 1024,
        }
    }
}

/// HTTP diagnostic settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Delay between passes
    #[serde(with = "secs")]
    pub interval: Duration,
    /// Connect and request timeout
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Host inventory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventorySettings {
    /// Delay between passes
    #[serde(with = "secs")]
    pub interval: Duration,
    /// Publish IPv6 DNS servers
    pub ipv6_dns_enabled: bool,
    /// Resolver configuration the DNS servers are read from
    pub resolv_conf: PathBuf,
    /// Upstream servers used when `resolv_conf` only lists a loopback stub
    pub upstream_resolv_conf: PathBuf,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            ipv6_dns_enabled: false,
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            upstream_resolv_conf: PathBuf::from("/run/systemd/resolve/resolv.conf"),
        }
    }
}

/// Metrics endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub listen: IpAddr,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            listen: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9111,
            path: "/healthmetrics".to_string(),
        }
    }
}

impl MetricsSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.port)
    }
}

/// Process-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ping: PingSettings,
    pub http: HttpSettings,
    pub inventory: InventorySettings,
    pub metrics: MetricsSettings,
}

impl Settings {
    /// Load settings from a YAML file; missing fields keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Reject values that would make a loop spin or the endpoint unreachable.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("ping.interval", self.ping.interval),
            ("ping.timeout", self.ping.timeout),
            ("http.interval", self.http.interval),
            ("http.timeout", self.http.timeout),
            ("inventory.interval", self.inventory.interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{} must be greater than zero", name)));
            }
        }

        if self.ping.payload_size == 0 || self.ping.payload_size > MAX_PING_PAYLOAD {
            return Err(Error::invalid_config(format!(
                "ping.payload_size must be between 1 and {} bytes, got {}",
                MAX_PING_PAYLOAD, self.ping.payload_size
            )));
        }

        if !self.metrics.path.starts_with('/') {
            return Err(Error::invalid_config(format!(
                "metrics.path must start with '/': {}",
                self.metrics.path
            )));
        }

        Ok(())
    }
}

/// Durations as whole seconds in settings files.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

// =============================================================================
// Target Lists
// =============================================================================

/// Split a target list into entries: one per line, `\r` and surrounding
/// whitespace stripped, blank lines and `#` comments skipped.
pub fn parse_targets(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read a target list file.
pub fn load_targets(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Ok(parse_targets(&text))
}

/// Read a target list if a path was configured, otherwise an empty list.
pub fn load_optional_targets(path: Option<&Path>) -> Result<Vec<String>> {
    path.map(load_targets).transpose().map(Option::unwrap_or_default)
}
