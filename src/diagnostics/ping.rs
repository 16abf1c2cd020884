//! Network Ping Diagnostic
//!
//! Sends one echo request per target per pass and records the round-trip
//! time and outcome.

use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::names::{PING_RESULT_MS, PING_RESULT_STATUS};
use super::{pause, Diagnostic};
use crate::config::PingSettings;
use crate::domain::ports::{EchoProber, PingOutcome};
use crate::error::Result;
use crate::metrics::{MetricKind, MetricsRegistry};

/// Periodic ICMP reachability check.
///
/// A failed echo only bumps the status counter; the RTT gauge keeps its last
/// successful value, so a stale RTT next to a growing failure count is the
/// signal that a target went dark.
pub struct NetworkPing {
    targets: Vec<String>,
    settings: PingSettings,
    payload: Vec<u8>,
    registry: Arc<MetricsRegistry>,
    prober: Arc<dyn EchoProber>,
}

impl NetworkPing {
    /// Create the diagnostic and register its metric families.
    pub fn new(
        targets: Vec<String>,
        settings: &PingSettings,
        registry: Arc<MetricsRegistry>,
        prober: Arc<dyn EchoProber>,
    ) -> Result<Self> {
        registry.create_series_family(
            PING_RESULT_MS,
            "Ping result time with resources",
            &["resource"],
            MetricKind::Gauge,
        )?;
        registry.create_series_family(
            PING_RESULT_STATUS,
            "Ping result status with resources",
            &["resource", "status"],
            MetricKind::Counter,
        )?;

        let mut payload = vec![0u8; settings.payload_size];
        rand::thread_rng().fill_bytes(&mut payload);

        Ok(Self {
            targets,
            settings: settings.clone(),
            payload,
            registry,
            prober,
        })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Probe every target once, in list order.
    ///
    /// Returns the number of targets recorded; fewer than the list length
    /// when cancelled mid-pass.
    #[instrument(skip(self, cancel), fields(targets = self.targets.len()))]
    pub async fn run_pass(&self, cancel: &CancellationToken) -> usize {
        let mut recorded = 0;

        for target in &self.targets {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.prober.echo(target, &self.payload, self.settings.timeout) => outcome,
            };

            self.record(target, outcome);
            recorded += 1;
        }

        recorded
    }

    fn record(&self, target: &str, outcome: PingOutcome) {
        if let Some(rtt) = outcome.round_trip() {
            self.registry
                .set_gauge(PING_RESULT_MS, &[target], rtt.as_micros() as f64 / 1000.0);
        }
        self.registry
            .inc_counter(PING_RESULT_STATUS, &[target, outcome.status_code()], 1.0);

        debug!(target, status = outcome.status_code(), "Ping recorded");
    }
}

impl std::fmt::Debug for NetworkPing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkPing")
            .field("targets", &self.targets)
            .field("settings", &self.settings)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[async_trait]
impl Diagnostic for NetworkPing {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting ping diagnostic: {} targets every {:?}",
            self.targets.len(),
            self.settings.interval
        );

        while !cancel.is_cancelled() {
            self.run_pass(&cancel).await;

            if !pause(self.settings.interval, &cancel).await {
                break;
            }
        }

        info!("Ping diagnostic shutting down");
    }
}
