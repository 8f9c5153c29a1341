//! Forwarder orchestration.
//!
//! Creates resolver files, primes the system servers, starts the watcher
//! and the UDP listener, then waits for SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

use crate::cache::ResponseCache;
use crate::dispatcher::QueryDispatcher;
use crate::resolver_files::ResolverFiles;
use crate::stats::Stats;
use crate::system_dns::SystemDns;
use crate::transport::udp::UdpTransport;
use crate::transport::upstream::UdpExchange;
use crate::upstream::{CustomDomain, UpstreamRegistry};

/// Configuration for the forwarder.
pub struct ProxyConfig {
    /// Local address to bind (e.g., 127.0.0.1:53)
    pub bind_addr: SocketAddr,
    /// Operator-supplied upstream servers, deduplicated
    pub servers: Vec<String>,
    /// Domains routed to `servers`
    pub domains: Vec<CustomDomain>,
    /// Host resolver configuration to ingest and watch
    pub resolv_conf: PathBuf,
    /// Directory holding per-domain resolver files
    pub resolver_dir: PathBuf,
    /// Timeout for each upstream attempt
    pub upstream_timeout: Duration,
}

/// Run the forwarder until a termination signal arrives.
///
/// Resolver files are removed on the way out, including when the listener
/// fails to bind.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let resolver_files = ResolverFiles::new(&config.resolver_dir, config.bind_addr.port());
    if let Err(e) = resolver_files.ensure(&config.domains) {
        resolver_files.teardown(&config.domains);
        return Err(e).context(
            "you either need to run with sudo or create the resolver directory and chown it to your user",
        );
    }

    let result = serve(&config).await;
    resolver_files.teardown(&config.domains);
    result
}

async fn serve(config: &ProxyConfig) -> anyhow::Result<()> {
    let mut registry = UpstreamRegistry::new(config.domains.clone());
    registry.add_custom_servers(&config.servers);
    let registry = Arc::new(registry);
    let cache = Arc::new(ResponseCache::new());
    let stats = Arc::new(Stats::new());

    let domains: Vec<&str> = config.domains.iter().map(CustomDomain::as_str).collect();
    info!(
        servers = %config.servers.join(","),
        domains = %domains.join(","),
        "user input"
    );

    let system_dns = Arc::new(SystemDns::new(
        &config.resolv_conf,
        registry.clone(),
        cache.clone(),
    ));
    system_dns.refresh();
    let watcher = tokio::spawn({
        let system_dns = system_dns.clone();
        async move { system_dns.watch().await }
    });

    let exchange = Arc::new(UdpExchange::new(config.upstream_timeout));
    let dispatcher = Arc::new(QueryDispatcher::new(
        registry,
        cache.clone(),
        exchange,
        stats.clone(),
    ));

    let udp = UdpTransport::bind(config.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "DNS forwarder listening on UDP");
    let listener = udp.start(dispatcher);

    // Log stats every minute
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            let snap = stats.snapshot_and_reset();
            info!(
                cache = cache.len(),
                requests = snap.requests,
                forwarded = snap.forwarded,
                cached = snap.cached,
                failed = snap.failed,
                avg_response_ms = snap.avg_response_ms,
                "stats"
            );
        }
    });

    let mut sigterm = signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("cannot listen for SIGINT")?;
            info!("signal SIGINT received, stopping");
        }
        _ = sigterm.recv() => info!("signal SIGTERM received, stopping"),
    }

    listener.abort();
    reporter.abort();
    watcher.abort();
    Ok(())
}
