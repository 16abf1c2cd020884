//! HTTP Fetch Adapter
//!
//! Implements the `HttpFetcher` port with `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::ports::{HttpFetcher, HttpOutcome};
use crate::error::{Error, Result};

/// GET-only fetcher used by the HTTP probe.
///
/// Built without a cookie store and without proxy support. TLS goes through
/// rustls, which does not check certificate revocation: the probe measures
/// availability, and a revocation responder outage must not read as the
/// target being down. Do not reuse this client where revocation matters.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Create a fetcher whose connect and overall request time are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(Error::HttpClient)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str) -> HttpOutcome {
        match self.client.get(url).send().await {
            Ok(response) => HttpOutcome::Response(response.status().as_u16()),
            Err(e) => classify(&e),
        }
    }
}

/// Timeouts, connection failures and status errors are modelled outcomes;
/// everything else (bad URL, redirect loops, body errors) is dropped.
fn classify(error: &reqwest::Error) -> HttpOutcome {
    let status = error.status().map(|s| s.as_u16());

    if error.is_timeout() || error.is_connect() || error.is_request() || status.is_some() {
        HttpOutcome::Failed(status)
    } else {
        HttpOutcome::Dropped(error.to_string())
    }
}
