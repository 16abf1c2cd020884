//! Domain Layer
//!
//! Ports describing the OS and network facilities the diagnostics need,
//! and the value objects that cross them.

pub mod ports;

pub use ports::{
    DiskUsage, EchoProber, HostFacts, HttpFetcher, HttpOutcome, PingOutcome,
    REQUEST_TIMEOUT_STATUS,
};
