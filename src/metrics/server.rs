//! Metrics Server
//!
//! Serves the registry in the Prometheus text format over HTTP/1 for
//! external scrapers, plus a `/healthz` liveness probe.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::MetricsRegistry;
use crate::error::{Error, Result};

/// Exposition endpoint bound to a listener.
pub struct MetricsServer {
    listener: TcpListener,
    path: String,
    registry: Arc<MetricsRegistry>,
}

impl MetricsServer {
    /// Bind the endpoint on `addr`.
    pub async fn bind(addr: SocketAddr, path: &str, registry: Arc<MetricsRegistry>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind metrics server on {}: {}", addr, e)))?;
        Ok(Self::from_listener(listener, path, registry))
    }

    /// Wrap an already bound listener.
    pub fn from_listener(listener: TcpListener, path: &str, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            listener,
            path: path.to_string(),
            registry,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept scrapes until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let path: Arc<str> = Arc::from(self.path.as_str());
        info!("Metrics server listening on {}{}", self.local_addr()?, path);

        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Metrics server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Metrics server accept error: {}", e);
                        continue;
                    }
                },
            };

            debug!(%peer, "Scrape connection");
            let io = TokioIo::new(stream);
            let registry = Arc::clone(&self.registry);
            let path = Arc::clone(&path);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let registry = Arc::clone(&registry);
                    let path = Arc::clone(&path);
                    async move { Ok::<_, Infallible>(handle(req, &path, &registry)) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Metrics server connection error: {}", e);
                }
            });
        }
    }
}

fn handle<B>(req: Request<B>, metrics_path: &str, registry: &MetricsRegistry) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    match req.uri().path() {
        p if p == metrics_path => match registry.encode_text() {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header(hyper::header::CONTENT_TYPE, registry.content_type())
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "encode error")),
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "encode error")
            }
        },
        "/healthz" => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
