// ═══════════════════════════════════════════════════════════════
// METRICS COLLECTOR - how many pastes, how many names, how many faceplants
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters, bumped by the connector as it works, and a tiny TCP
// endpoint that hands out a JSON snapshot to whoever asks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, error};
use serde::Serialize;

/// The metrics snapshot - what gets serialized to JSON
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub domain_requests: u64,
    pub out_of_scope_requests: u64,
    pub ignored_requests: u64,
    pub pipelines_started: u64,
    pub pipelines_completed: u64,
    pub pipelines_aborted: u64,
    pub documents_fetched: u64,
    pub names_discovered: u64,
    pub names_dropped: u64,
    pub fetch_failures: u64,
    pub decode_failures: u64,
    pub uptime_seconds: u64,
    pub names_per_minute: f64,
    pub status: String,
}

/// Thread-safe atomic metrics collector
#[derive(Debug)]
pub struct MetricsCollector {
    domain_requests: AtomicU64,
    out_of_scope_requests: AtomicU64,
    ignored_requests: AtomicU64,
    pipelines_started: AtomicU64,
    pipelines_completed: AtomicU64,
    pipelines_aborted: AtomicU64,
    documents_fetched: AtomicU64,
    names_discovered: AtomicU64,
    names_dropped: AtomicU64,
    fetch_failures: AtomicU64,
    decode_failures: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            domain_requests: AtomicU64::new(0),
            out_of_scope_requests: AtomicU64::new(0),
            ignored_requests: AtomicU64::new(0),
            pipelines_started: AtomicU64::new(0),
            pipelines_completed: AtomicU64::new(0),
            pipelines_aborted: AtomicU64::new(0),
            documents_fetched: AtomicU64::new(0),
            names_discovered: AtomicU64::new(0),
            names_dropped: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_domain_requests(&self) {
        self.domain_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_out_of_scope(&self) {
        self.out_of_scope_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ignored(&self) {
        self.ignored_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pipelines_started(&self) {
        self.pipelines_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pipelines_completed(&self) {
        self.pipelines_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pipelines_aborted(&self) {
        self.pipelines_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_documents_fetched(&self) {
        self.documents_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_names_discovered(&self) {
        self.names_discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_names_dropped(&self) {
        self.names_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_decode_failures(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all metrics (lock-free reads)
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let names = self.names_discovered.load(Ordering::Relaxed);
        let names_per_minute = if uptime > 0 {
            (names as f64 / uptime as f64) * 60.0
        } else {
            0.0
        };

        MetricsSnapshot {
            domain_requests: self.domain_requests.load(Ordering::Relaxed),
            out_of_scope_requests: self.out_of_scope_requests.load(Ordering::Relaxed),
            ignored_requests: self.ignored_requests.load(Ordering::Relaxed),
            pipelines_started: self.pipelines_started.load(Ordering::Relaxed),
            pipelines_completed: self.pipelines_completed.load(Ordering::Relaxed),
            pipelines_aborted: self.pipelines_aborted.load(Ordering::Relaxed),
            documents_fetched: self.documents_fetched.load(Ordering::Relaxed),
            names_discovered: names,
            names_dropped: self.names_dropped.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            names_per_minute,
            status: "operational".to_string(),
        }
    }
}

/// Serve metrics snapshots as JSON on `port` until shutdown.
pub async fn run_metrics_server(
    metrics: Arc<MetricsCollector>,
    port: u16,
    shutdown: &mut watch::Receiver<bool>,
) {
    use tokio::net::TcpListener;
    use tokio::io::AsyncWriteExt;

    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    info!("📊 Metrics server listening on http://{}", addr);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((mut stream, _addr)) => {
                        let snapshot = metrics.snapshot();
                        let json = serde_json::to_string_pretty(&snapshot)
                            .unwrap_or_else(|_| "{}".to_string());

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            json.len(),
                            json,
                        );

                        let _ = stream.write_all(response.as_bytes()).await;
                    }
                    Err(e) => {
                        error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("Metrics server: shutting down");
                break;
            }
        }
    }
}
