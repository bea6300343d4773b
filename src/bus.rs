// =============================================================================
// bus.rs — THE OUTBOUND BUS
// =============================================================================
//
// Two topics: discovered names and log lines. Any number of connectors can
// publish at once; crossbeam does the synchronisation, we never hold a lock.
//
// Publishing never blocks. If a topic is full the event is dropped and we say
// so loudly in the tracing output, because a connector stuck behind a slow
// consumer is worse than a lost log line.
// =============================================================================

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::error;

use crate::models::{LogEvent, NameDiscovery};

/// Where connectors send what they find. Both methods return false when the
/// event was dropped instead of delivered.
pub trait EventBus: Send + Sync {
    fn publish_log(&self, event: LogEvent) -> bool;
    fn publish_name(&self, event: NameDiscovery) -> bool;
}

/// In-process bus over two bounded crossbeam channels.
#[derive(Debug, Clone)]
pub struct ChannelBus {
    names_tx: Sender<NameDiscovery>,
    logs_tx: Sender<LogEvent>,
}

/// The receiving side of a [`ChannelBus`].
#[derive(Debug, Clone)]
pub struct BusSubscription {
    pub names: Receiver<NameDiscovery>,
    pub logs: Receiver<LogEvent>,
}

impl ChannelBus {
    /// Create a bus whose topics each hold up to `capacity` events.
    pub fn bounded(capacity: usize) -> (Self, BusSubscription) {
        let (names_tx, names) = crossbeam_channel::bounded(capacity);
        let (logs_tx, logs) = crossbeam_channel::bounded(capacity);
        (Self { names_tx, logs_tx }, BusSubscription { names, logs })
    }
}

impl EventBus for ChannelBus {
    fn publish_log(&self, event: LogEvent) -> bool {
        match self.logs_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                error!(message = %event.message, "log topic full, dropping log event");
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                error!(message = %event.message, "log topic has no subscriber, dropping log event");
                false
            }
        }
    }

    fn publish_name(&self, event: NameDiscovery) -> bool {
        match self.names_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                error!(name = %event.name, domain = %event.domain, "name topic full, dropping discovery");
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                error!(name = %event.name, domain = %event.domain, "name topic has no subscriber, dropping discovery");
                false
            }
        }
    }
}

impl BusSubscription {
    /// Everything currently waiting on the name topic.
    pub fn drain_names(&self) -> Vec<NameDiscovery> {
        self.names.try_iter().collect()
    }

    /// Everything currently waiting on the log topic.
    pub fn drain_logs(&self) -> Vec<LogEvent> {
        self.logs.try_iter().collect()
    }
}
