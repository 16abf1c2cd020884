//! Hostwatch Agent
//!
//! Runs the ping, HTTP and inventory diagnostics and serves their metrics
//! until interrupted.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hostwatch::adapters::{IcmpProber, ReqwestFetcher, SysinfoHost};
use hostwatch::config::{self, Settings};
use hostwatch::{HostInventory, HttpProbe, MetricsRegistry, MetricsServer, NetworkPing, Scheduler};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Hostwatch - host reachability and inventory metrics agent
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML settings file; missing fields keep their defaults
    #[arg(long, short = 'c', env = "HOSTWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Hosts to ping, one per line
    #[arg(long, env = "HOSTWATCH_PINGS_FILE")]
    pings_file: Option<PathBuf>,

    /// URLs to fetch, one per line
    #[arg(long, env = "HOSTWATCH_HTTP_FILE")]
    http_file: Option<PathBuf>,

    /// Process name substrings to watch, one per line
    #[arg(long, env = "HOSTWATCH_PROCESSES_FILE")]
    processes_file: Option<PathBuf>,

    /// Metrics endpoint bind address
    #[arg(long, env = "HOSTWATCH_LISTEN")]
    listen: Option<IpAddr>,

    /// Metrics endpoint port
    #[arg(long, env = "HOSTWATCH_PORT")]
    port: Option<u16>,

    /// Metrics endpoint path
    #[arg(long, env = "HOSTWATCH_METRICS_PATH")]
    metrics_path: Option<String>,

    /// Ping interval in seconds
    #[arg(long, env = "HOSTWATCH_PING_INTERVAL")]
    ping_interval: Option<u64>,

    /// HTTP interval in seconds
    #[arg(long, env = "HOSTWATCH_HTTP_INTERVAL")]
    http_interval: Option<u64>,

    /// Inventory interval in seconds
    #[arg(long, env = "HOSTWATCH_INVENTORY_INTERVAL")]
    inventory_interval: Option<u64>,

    /// Publish IPv6 DNS servers
    #[arg(long, env = "HOSTWATCH_IPV6_DNS")]
    ipv6_dns: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Settings file (or defaults) with command-line overrides applied.
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_yaml_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };

        if let Some(listen) = self.listen {
            settings.metrics.listen = listen;
        }
        if let Some(port) = self.port {
            settings.metrics.port = port;
        }
        if let Some(path) = &self.metrics_path {
            settings.metrics.path = path.clone();
        }
        if let Some(secs) = self.ping_interval {
            settings.ping.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.http_interval {
            settings.http.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.inventory_interval {
            settings.inventory.interval = Duration::from_secs(secs);
        }
        if self.ipv6_dns {
            settings.inventory.ipv6_dns_enabled = true;
        }

        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let settings = args.settings()?;

    let pings = config::load_optional_targets(args.pings_file.as_deref())
        .context("Failed to read ping targets")?;
    let resources = config::load_optional_targets(args.http_file.as_deref())
        .context("Failed to read HTTP resources")?;
    let watch = config::load_optional_targets(args.processes_file.as_deref())
        .context("Failed to read process watch-list")?;

    info!("Starting hostwatch");
    info!("  Ping targets: {}", pings.len());
    info!("  HTTP resources: {}", resources.len());
    info!("  Watched processes: {}", watch.len());
    info!(
        "  Metrics endpoint: {}{}",
        settings.metrics.socket_addr(),
        settings.metrics.path
    );

    let registry = Arc::new(MetricsRegistry::new());

    let prober = Arc::new(IcmpProber::new());
    let fetcher = Arc::new(
        ReqwestFetcher::new(settings.http.timeout).context("Failed to build HTTP client")?,
    );
    let host = Arc::new(
        SysinfoHost::new(settings.inventory.resolv_conf.clone())
            .with_upstream_resolv_conf(settings.inventory.upstream_resolv_conf.clone()),
    );

    let ping = NetworkPing::new(pings, &settings.ping, Arc::clone(&registry), prober)
        .context("Failed to create ping diagnostic")?;
    let http = HttpProbe::new(resources, &settings.http, Arc::clone(&registry), fetcher)
        .context("Failed to create HTTP diagnostic")?;
    let inventory = HostInventory::new(watch, &settings.inventory, Arc::clone(&registry), host)
        .context("Failed to create inventory diagnostic")?;

    let server = MetricsServer::bind(
        settings.metrics.socket_addr(),
        &settings.metrics.path,
        Arc::clone(&registry),
    )
    .await
    .context("Failed to start metrics endpoint")?;

    let cancel = CancellationToken::new();

    let server_cancel = cancel.child_token();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_cancel).await {
            error!("Metrics server error: {}", e);
        }
    });

    let mut scheduler = Scheduler::new(cancel.child_token());
    scheduler
        .add(Arc::new(ping))
        .add(Arc::new(http))
        .add(Arc::new(inventory));
    scheduler.start();

    shutdown_signal().await;
    info!("Shutdown signal received");

    cancel.cancel();
    scheduler.shutdown().await;
    if let Err(e) = server_handle.await {
        error!("Metrics server task failed: {}", e);
    }

    info!("Hostwatch shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "surge_ping=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
