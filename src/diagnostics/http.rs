//! HTTP Probe Diagnostic
//!
//! Issues one GET per URL per pass and records latency and status, labelled
//! by the URL host.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::names::{HTTP_RESULT_MS, HTTP_RESULT_STATUS};
use super::{pause, Diagnostic};
use crate::config::HttpSettings;
use crate::domain::ports::{HttpFetcher, HttpOutcome};
use crate::error::{Error, Result};
use crate::metrics::{MetricKind, MetricsRegistry};

/// Periodic HTTP availability check.
pub struct HttpProbe {
    resources: Vec<String>,
    settings: HttpSettings,
    registry: Arc<MetricsRegistry>,
    fetcher: Arc<dyn HttpFetcher>,
}

impl HttpProbe {
    /// Create the probe and register its metric families.
    ///
    /// Every resource must contain `http`; the first one that does not fails
    /// construction with [`Error::InvalidConfiguration`].
    pub fn new(
        resources: Vec<String>,
        settings: &HttpSettings,
        registry: Arc<MetricsRegistry>,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Result<Self> {
        if let Some(bad) = resources.iter().find(|r| !r.contains("http")) {
            return Err(Error::invalid_config(format!(
                "Resource \"{}\" is not a valid HTTP target",
                bad
            )));
        }

        registry.create_series_family(
            HTTP_RESULT_MS,
            "Http result time with resources",
            &["resource"],
            MetricKind::Gauge,
        )?;
        registry.create_series_family(
            HTTP_RESULT_STATUS,
            "Http result status with resources",
            &["resource", "status"],
            MetricKind::Counter,
        )?;

        Ok(Self {
            resources,
            settings: settings.clone(),
            registry,
            fetcher,
        })
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Fetch every resource once, in list order.
    ///
    /// Returns the number of resources recorded. Unparseable URLs and
    /// dropped errors are logged and not counted.
    #[instrument(skip(self, cancel), fields(resources = self.resources.len()))]
    pub async fn run_pass(&self, cancel: &CancellationToken) -> usize {
        let mut recorded = 0;

        for resource in &self.resources {
            if cancel.is_cancelled() {
                break;
            }

            let url = match Url::parse(resource) {
                Ok(url) => url,
                Err(e) => {
                    warn!(resource = %resource, "Skipping unparseable URL: {}", e);
                    continue;
                }
            };
            let Some(host) = url.host_str().map(str::to_string) else {
                warn!(resource = %resource, "Skipping URL without host");
                continue;
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.fetcher.get(url.as_str()) => outcome,
            };
            let elapsed_ms = started.elapsed().as_micros() as f64 / 1000.0;

            if self.record(&host, &outcome, elapsed_ms) {
                recorded += 1;
            }
        }

        recorded
    }

    fn record(&self, host: &str, outcome: &HttpOutcome, elapsed_ms: f64) -> bool {
        let Some(status) = outcome.status_code() else {
            if let HttpOutcome::Dropped(reason) = outcome {
                warn!(host, error_kind = "dropped", "HTTP probe error not recorded: {}", reason);
            }
            return false;
        };

        let latency = match outcome {
            HttpOutcome::Response(_) => elapsed_ms,
            _ => 0.0,
        };
        self.registry.set_gauge(HTTP_RESULT_MS, &[host], latency);
        self.registry
            .inc_counter(HTTP_RESULT_STATUS, &[host, status.as_str()], 1.0);

        debug!(host, status = %status, latency_ms = latency, "HTTP probe recorded");
        true
    }
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe")
            .field("resources", &self.resources)
            .field("settings", &self.settings)
            .finish()
    }
}

#[async_trait]
impl Diagnostic for HttpProbe {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting HTTP diagnostic: {} resources every {:?} (timeout {:?})",
            self.resources.len(),
            self.settings.interval,
            self.settings.timeout
        );

        while !cancel.is_cancelled() {
            self.run_pass(&cancel).await;

            if !pause(self.settings.interval, &cancel).await {
                break;
            }
        }

        info!("HTTP diagnostic shutting down");
    }
}
