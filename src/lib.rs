//! Hostwatch - Host Monitoring Agent
//!
//! Periodically probes network reachability (ICMP echo, HTTP GET), tracks a
//! watch-list of processes and samples host facts (CPU, RAM, disks, uptime,
//! DNS servers), publishing everything as Prometheus series for scraping.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Scheduler                            │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐    │
//! │   │ NetworkPing │   │  HttpProbe  │   │  HostInventory   │    │
//! │   └──────┬──────┘   └──────┬──────┘   └────────┬─────────┘    │
//! └──────────┼─────────────────┼───────────────────┼──────────────┘
//!            ▼                 ▼                   ▼
//!      EchoProber         HttpFetcher          HostFacts      (ports)
//!            │                 │                   │
//!            └─────────────────┼───────────────────┘
//!                              ▼
//!                       MetricsRegistry ──▶ MetricsServer ──▶ scraper
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Production implementations of the domain ports
//! - [`config`] - Settings and target list loaders
//! - [`diagnostics`] - The polling routines
//! - [`domain`] - Ports and the outcomes that cross them
//! - [`error`] - Error types
//! - [`metrics`] - Series registry and exposition endpoint
//! - [`scheduler`] - Task lifecycle for the diagnostics

pub mod adapters;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod scheduler;

// Re-export commonly used types
pub use config::Settings;
pub use diagnostics::{Diagnostic, HostInventory, HttpProbe, NetworkPing};
pub use error::{Error, Result};
pub use metrics::{MetricKind, MetricsRegistry, MetricsServer};
pub use scheduler::Scheduler;
