// ██████╗  █████╗ ███████╗████████╗███████╗
// ██╔══██╗██╔══██╗██╔════╝╚══██╔══╝██╔════╝
// ██████╔╝███████║███████╗   ██║   █████╗
// ██╔═══╝ ██╔══██║╚════██║   ██║   ██╔══╝
// ██║     ██║  ██║███████║   ██║   ███████╗
// ╚═╝     ╚═╝  ╚═╝╚══════╝   ╚═╝   ╚══════╝
//
// R E C O N   E N G I N E
//
// Pastes in, hostnames out. One polite query every three seconds.

mod bus;
mod config;
mod error;
mod fetcher;
mod metrics;
mod models;
mod publisher;
mod rate_limiter;
mod scope;
mod sources;

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::bus::ChannelBus;
use crate::config::Config;
use crate::fetcher::HttpFetcher;
use crate::metrics::MetricsCollector;
use crate::models::{DnsRequest, SourceTag};
use crate::publisher::EventRelay;
use crate::scope::ScopeConfig;
use crate::sources::pastebin::{self, PastebinConnector};
use crate::sources::request_channels;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("🔎 PASTE RECON ENGINE initializing...");

    let config = Arc::new(Config::from_env());
    config.validate().context("invalid configuration")?;
    info!(
        api = %config.api_base_url,
        domains = ?config.scope_domains,
        "✅ Configuration loaded"
    );

    if config.scope_domains.is_empty() {
        warn!("No domains in scope (PASTE_RECON_DOMAINS is empty) — every lookup will be dropped");
    }

    let scope = Arc::new(ScopeConfig::new(&config.scope_domains));
    let (bus, subscription) = ChannelBus::bounded(config.bus_capacity);
    let metrics_collector = Arc::new(MetricsCollector::new());
    let fetcher = HttpFetcher::new(config.http_timeout, &config.user_agent)
        .context("failed to build HTTP client")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (channels, inbox) = request_channels(config.request_channel_capacity);

    // ═══════════════════════════════════════════
    // CONNECTOR
    // ═══════════════════════════════════════════
    let connector = PastebinConnector::new(
        config.api_base_url.clone(),
        fetcher,
        scope.clone(),
        Arc::new(bus),
        metrics_collector.clone(),
    );
    let connector_shutdown = shutdown_rx.clone();
    let connector_handle = tokio::spawn(async move {
        info!("📡 {} connector: ONLINE", pastebin::NAME);
        connector.run(inbox, connector_shutdown).await;
        info!("📡 {} connector: OFFLINE", pastebin::NAME);
    });

    // ═══════════════════════════════════════════
    // RELAY
    // ═══════════════════════════════════════════
    let (relay, relay_stats) = EventRelay::new(config.clone(), subscription, shutdown_rx.clone());
    let relay_handle = tokio::spawn(async move {
        if let Err(e) = relay.run().await {
            error!("📤 Relay error: {:#}", e);
        }
    });

    // ═══════════════════════════════════════════
    // METRICS
    // ═══════════════════════════════════════════
    let metrics_for_server = metrics_collector.clone();
    let metrics_port = config.metrics_port;
    let mut metrics_shutdown = shutdown_rx.clone();
    let metrics_handle = tokio::spawn(async move {
        metrics::run_metrics_server(metrics_for_server, metrics_port, &mut metrics_shutdown).await;
    });

    // Kick off one lookup per root domain, the way an enumeration would.
    for domain in scope.domains() {
        let req = DnsRequest::for_domain(domain.clone(), SourceTag::External, "config");
        if let Err(e) = channels.dns.send(req).await {
            error!(domain = %domain, error = %e, "failed to queue seed lookup");
        }
    }

    info!(
        seeds = scope.domains().len(),
        rate_limit_secs = pastebin::RATE_LIMIT.as_secs(),
        "🟢 Engine running — Ctrl+C for graceful shutdown"
    );

    match signal::ctrl_c().await {
        Ok(()) => warn!("🛑 Shutdown signal received!"),
        Err(err) => error!("❌ Signal listener error: {}", err),
    }
    let _ = shutdown_tx.send(true);
    drop(channels);

    info!("⏳ Waiting for tasks to complete (timeout: 10s)...");
    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let _ = tokio::join!(connector_handle, relay_handle, metrics_handle);
    })
    .await;

    let snapshot = metrics_collector.snapshot();
    let relayed = relay_stats.snapshot();
    info!(
        names = relayed.names_relayed,
        logs = relayed.logs_relayed,
        errors = relayed.relay_errors,
        "📤 Relay totals"
    );
    info!(
        pipelines = snapshot.pipelines_started,
        names = snapshot.names_discovered,
        failures = snapshot.fetch_failures + snapshot.decode_failures,
        "💀 PASTE RECON ENGINE: OFFLINE"
    );
    Ok(())
}
