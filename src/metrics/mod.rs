//! Metrics module
//!
//! Registry of exported metric families and the scrape endpoint serving it.

mod registry;
mod server;

pub use registry::{FamilyHandle, MetricKind, MetricsRegistry};
pub use server::MetricsServer;
