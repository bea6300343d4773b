// =============================================================================
// publisher.rs — THE RELAY
// =============================================================================
//
// Connectors publish onto the in-process bus. This module drains the bus and
// forwards every event, serialized as JSON, to wherever the rest of the
// system is listening:
//
// - Redis pub/sub, when PASTE_RECON_REDIS_URL is set. Names and log lines
//   go to separate channels.
// - stdout as JSON lines, when it isn't. Handy for piping into jq.
//
// No sorted sets, no history. Whatever nobody is subscribed to is gone.
// =============================================================================

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::TryRecvError;
use redis::AsyncCommands;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bus::BusSubscription;
use crate::config::Config;
use crate::models::{LogEvent, NameDiscovery};

const BATCH_SIZE: usize = 50;

/// Relay statistics for metrics.
#[derive(Debug)]
pub struct RelayStats {
    pub names_relayed: portable_atomic::AtomicU64,
    pub logs_relayed: portable_atomic::AtomicU64,
    pub relay_errors: portable_atomic::AtomicU64,
    pub batches_sent: portable_atomic::AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            names_relayed: portable_atomic::AtomicU64::new(0),
            logs_relayed: portable_atomic::AtomicU64::new(0),
            relay_errors: portable_atomic::AtomicU64::new(0),
            batches_sent: portable_atomic::AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        use portable_atomic::Ordering;
        RelaySnapshot {
            names_relayed: self.names_relayed.load(Ordering::Relaxed),
            logs_relayed: self.logs_relayed.load(Ordering::Relaxed),
            relay_errors: self.relay_errors.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A serializable snapshot of relay stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelaySnapshot {
    pub names_relayed: u64,
    pub logs_relayed: u64,
    pub relay_errors: u64,
    pub batches_sent: u64,
}

/// Where relayed events end up.
enum Sink {
    Redis {
        con: redis::aio::MultiplexedConnection,
        names_channel: String,
        log_channel: String,
    },
    Lines(Box<dyn Write + Send>),
}

/// One drained batch, names and logs kept apart.
#[derive(Debug, Default)]
struct Batch {
    names: Vec<NameDiscovery>,
    logs: Vec<LogEvent>,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.names.is_empty() && self.logs.is_empty()
    }

    fn clear(&mut self) {
        self.names.clear();
        self.logs.clear();
    }
}

/// Drains the bus and forwards events until shutdown.
pub struct EventRelay {
    config: Arc<Config>,
    subscription: BusSubscription,
    shutdown: watch::Receiver<bool>,
    stats: Arc<RelayStats>,
}

impl EventRelay {
    pub fn new(
        config: Arc<Config>,
        subscription: BusSubscription,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, Arc<RelayStats>) {
        let stats = Arc::new(RelayStats::new());
        let stats_clone = Arc::clone(&stats);
        (
            Self {
                config,
                subscription,
                shutdown,
                stats,
            },
            stats_clone,
        )
    }

    /// Connect to the configured sink and relay until shutdown. Events still
    /// on the bus at shutdown are flushed before returning.
    pub async fn run(self) -> Result<()> {
        let sink = match self.config.redis_url.as_deref() {
            Some(url) => match self.connect_redis(url).await? {
                Some(sink) => sink,
                None => return Ok(()),
            },
            None => {
                info!("No Redis configured — relaying events to stdout as JSON lines");
                Sink::Lines(Box::new(std::io::stdout()))
            }
        };
        self.relay(sink).await
    }

    /// Connect with retry. `None` means shutdown arrived first.
    async fn connect_redis(&self, url: &str) -> Result<Option<Sink>> {
        let client = redis::Client::open(url)?;
        loop {
            match client.get_multiplexed_async_connection().await {
                Ok(con) => {
                    info!(
                        names_channel = %self.config.redis_names_channel,
                        log_channel = %self.config.redis_log_channel,
                        "Redis connection established — relaying discoveries"
                    );
                    return Ok(Some(Sink::Redis {
                        con,
                        names_channel: self.config.redis_names_channel.clone(),
                        log_channel: self.config.redis_log_channel.clone(),
                    }));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to connect to Redis — retrying in 5 seconds");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    if *self.shutdown.borrow() {
                        info!("Shutdown received during Redis connection retry — exiting");
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn relay(self, mut sink: Sink) -> Result<()> {
        let mut batch = Batch::default();

        loop {
            if *self.shutdown.borrow() {
                info!("Shutdown signal received — flushing remaining events");
                batch.clear();
                batch.names.extend(self.subscription.names.try_iter());
                batch.logs.extend(self.subscription.logs.try_iter());
                if !batch.is_empty() {
                    if let Err(e) = self.send_batch(&mut sink, &batch).await {
                        error!(error = %e, "Failed to relay final batch during shutdown");
                    }
                }
                info!("Relay shutting down");
                return Ok(());
            }

            batch.clear();
            let names_open = drain_into(&self.subscription.names, &mut batch.names);
            let logs_open = drain_into(&self.subscription.logs, &mut batch.logs);

            if !batch.is_empty() {
                if let Err(e) = self.send_batch(&mut sink, &batch).await {
                    error!(
                        error = %e,
                        names = batch.names.len(),
                        logs = batch.logs.len(),
                        "Failed to relay batch — events lost"
                    );
                    self.stats.relay_errors.fetch_add(
                        (batch.names.len() + batch.logs.len()) as u64,
                        portable_atomic::Ordering::Relaxed,
                    );
                }
                continue;
            }

            if !names_open && !logs_open {
                info!("Bus disconnected — relay shutting down");
                return Ok(());
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn send_batch(&self, sink: &mut Sink, batch: &Batch) -> Result<()> {
        use portable_atomic::Ordering;

        match sink {
            Sink::Redis { con, names_channel, log_channel } => {
                for event in &batch.names {
                    let json = serde_json::to_string(event)?;
                    let _: () = con.publish(names_channel.as_str(), &json).await?;
                    self.stats.names_relayed.fetch_add(1, Ordering::Relaxed);
                }
                for event in &batch.logs {
                    let json = serde_json::to_string(event)?;
                    let _: () = con.publish(log_channel.as_str(), &json).await?;
                    self.stats.logs_relayed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Sink::Lines(out) => {
                write_lines(out.as_mut(), batch)?;
                self.stats
                    .names_relayed
                    .fetch_add(batch.names.len() as u64, Ordering::Relaxed);
                self.stats
                    .logs_relayed
                    .fetch_add(batch.logs.len() as u64, Ordering::Relaxed);
            }
        }

        self.stats.batches_sent.fetch_add(1, Ordering::Relaxed);
        debug!(
            names = batch.names.len(),
            logs = batch.logs.len(),
            "Batch relayed"
        );
        Ok(())
    }
}

/// Pull up to a batch worth of events. Returns false once the topic is
/// empty and every sender is gone.
fn drain_into<T>(rx: &crossbeam_channel::Receiver<T>, out: &mut Vec<T>) -> bool {
    while out.len() < BATCH_SIZE {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
    true
}

/// One JSON object per line, tagged with the topic it came from.
fn write_lines(out: &mut dyn Write, batch: &Batch) -> Result<()> {
    #[derive(Serialize)]
    #[serde(tag = "topic", rename_all = "lowercase")]
    enum Line<'a> {
        Name(&'a NameDiscovery),
        Log(&'a LogEvent),
    }

    for event in &batch.names {
        serde_json::to_writer(&mut *out, &Line::Name(event))?;
        out.write_all(b"\n")?;
    }
    for event in &batch.logs {
        serde_json::to_writer(&mut *out, &Line::Log(event))?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
