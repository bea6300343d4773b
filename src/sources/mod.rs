// =============================================================================
// sources/mod.rs — THE INBOX
// =============================================================================
//
// Every data source gets the same four inbound queues: domain lookups,
// address lookups, ASN lookups, WHOIS lookups. The orchestration layer holds
// the senders, the source's worker holds the receivers, and the worker is
// expected to drain all four even when it only cares about one of them.
//
// The paste archive connector is the only source living here today.
// =============================================================================

pub mod pastebin;

use tokio::sync::mpsc;

use crate::models::{AddrRequest, AsnRequest, DnsRequest, WhoisRequest};

/// Sending halves of a source's inbound queues.
#[derive(Debug, Clone)]
pub struct RequestChannels {
    pub dns: mpsc::Sender<DnsRequest>,
    pub addr: mpsc::Sender<AddrRequest>,
    pub asn: mpsc::Sender<AsnRequest>,
    pub whois: mpsc::Sender<WhoisRequest>,
}

/// Receiving halves, owned by the source's worker.
#[derive(Debug)]
pub struct RequestInbox {
    pub dns: mpsc::Receiver<DnsRequest>,
    pub addr: mpsc::Receiver<AddrRequest>,
    pub asn: mpsc::Receiver<AsnRequest>,
    pub whois: mpsc::Receiver<WhoisRequest>,
}

/// Create the four inbound queues, each holding up to `capacity` requests.
pub fn request_channels(capacity: usize) -> (RequestChannels, RequestInbox) {
    let (dns_tx, dns_rx) = mpsc::channel(capacity);
    let (addr_tx, addr_rx) = mpsc::channel(capacity);
    let (asn_tx, asn_rx) = mpsc::channel(capacity);
    let (whois_tx, whois_rx) = mpsc::channel(capacity);

    (
        RequestChannels {
            dns: dns_tx,
            addr: addr_tx,
            asn: asn_tx,
            whois: whois_tx,
        },
        RequestInbox {
            dns: dns_rx,
            addr: addr_rx,
            asn: asn_rx,
            whois: whois_rx,
        },
    )
}
