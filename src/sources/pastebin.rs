// =============================================================================
// pastebin.rs — THE PASTE ARCHIVE CONNECTOR
// =============================================================================
//
// psbdmp.ws indexes public pastes and lets you search them by keyword. People
// paste config files, credential dumps, and log output with alarming
// regularity, and all of those are full of hostnames. For an in-scope domain
// we:
//
//   1. ask /api/search/{domain} which pastes mention it,
//   2. pull every listed paste from /api/dump/get/{id}, in list order,
//   3. run the domain's hostname pattern over the text,
//   4. publish one discovery per match. Duplicates and all.
//
// One pipeline at a time, three seconds of quiet between them. The first
// failed fetch ends the pipeline, gets one log line, and that's that: no
// retries, no partial batches after the failure. A garbage search response
// gets the same treatment instead of taking the whole process down with it.
//
// Address, ASN and WHOIS requests mean nothing to a paste archive. We still
// read them off their queues so nobody upstream stalls waiting on us.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::bus::EventBus;
use crate::error::QueryError;
use crate::fetcher::PageFetcher;
use crate::metrics::MetricsCollector;
use crate::models::{DnsRequest, DumpSearchResponse, LogEvent, NameDiscovery, SourceTag};
use crate::rate_limiter::RateLimiter;
use crate::scope::ScopeMatcher;
use crate::sources::RequestInbox;

/// Name this connector publishes under.
pub const NAME: &str = "Pastebin";

/// Minimum quiet time between two query pipelines.
pub const RATE_LIMIT: Duration = Duration::from_secs(3);

/// What a finished pipeline produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Pastes fetched and scanned.
    pub documents: usize,
    /// Discovery events that made it onto the bus.
    pub names: usize,
    /// Matches the bus had no room for.
    pub dropped: usize,
}

/// The paste archive connector. Started once, runs until shutdown.
pub struct PastebinConnector<F> {
    name: String,
    tag: SourceTag,
    base_url: String,
    fetcher: F,
    scope: Arc<dyn ScopeMatcher>,
    bus: Arc<dyn EventBus>,
    metrics: Arc<MetricsCollector>,
    limiter: RateLimiter,
}

impl<F: PageFetcher> PastebinConnector<F> {
    pub fn new(
        base_url: impl Into<String>,
        fetcher: F,
        scope: Arc<dyn ScopeMatcher>,
        bus: Arc<dyn EventBus>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            name: NAME.to_string(),
            tag: SourceTag::Api,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetcher,
            scope,
            bus,
            metrics,
            limiter: RateLimiter::new(RATE_LIMIT),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> SourceTag {
        self.tag
    }

    /// The dispatch loop. Shutdown is only noticed between requests; a fetch
    /// or rate-limit sleep in progress runs to completion first.
    pub async fn run(mut self, mut inbox: RequestInbox, mut shutdown: watch::Receiver<bool>) {
        info!(
            source = %self.name,
            base_url = %self.base_url,
            rate_limit_secs = self.limiter.interval().as_secs(),
            "Paste archive connector online"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender gone: nobody is left to tell us to stop.
                        break;
                    }
                }
                Some(req) = inbox.dns.recv() => {
                    self.handle_dns_request(req).await;
                    // A pipeline can take a while; don't leave the other
                    // producers stuck behind it.
                    self.drain_unsupported(&mut inbox);
                }
                Some(req) = inbox.addr.recv() => {
                    trace!(source = %self.name, address = %req.address, "ignoring address request");
                    self.metrics.increment_ignored();
                }
                Some(req) = inbox.asn.recv() => {
                    trace!(source = %self.name, asn = req.asn, "ignoring ASN request");
                    self.metrics.increment_ignored();
                }
                Some(req) = inbox.whois.recv() => {
                    trace!(source = %self.name, domain = %req.domain, "ignoring WHOIS request");
                    self.metrics.increment_ignored();
                }
            }
        }

        info!(source = %self.name, "Paste archive connector offline");
    }

    /// Discard whatever is waiting on the address, ASN and WHOIS queues.
    fn drain_unsupported(&self, inbox: &mut RequestInbox) {
        while inbox.addr.try_recv().is_ok() {
            self.metrics.increment_ignored();
        }
        while inbox.asn.try_recv().is_ok() {
            self.metrics.increment_ignored();
        }
        while inbox.whois.try_recv().is_ok() {
            self.metrics.increment_ignored();
        }
    }

    /// Scope check, rate limit, pipeline. Out-of-scope domains vanish
    /// without a trace on the bus.
    pub async fn handle_dns_request(&mut self, req: DnsRequest) {
        self.metrics.increment_domain_requests();

        let domain = req.domain.trim().trim_end_matches('.').to_lowercase();
        if !self.scope.is_domain_in_scope(&domain) {
            debug!(source = %self.name, domain = %req.domain, "domain out of scope, dropping request");
            self.metrics.increment_out_of_scope();
            return;
        }

        self.limiter.wait().await;
        self.limiter.stamp();
        self.metrics.increment_pipelines_started();

        let (Some(root), Some(re)) = (self.scope.which_domain(&domain), self.scope.domain_regex(&domain))
        else {
            warn!(source = %self.name, domain = %domain, "in scope but no hostname pattern, skipping query");
            self.metrics.increment_pipelines_aborted();
            self.limiter.stamp();
            return;
        };

        match self.execute_query(&domain, &root, &re).await {
            Ok(report) => {
                self.metrics.increment_pipelines_completed();
                info!(
                    source = %self.name,
                    domain = %domain,
                    documents = report.documents,
                    names = report.names,
                    dropped = report.dropped,
                    "paste query complete"
                );
            }
            Err(err) => {
                self.metrics.increment_pipelines_aborted();
                self.report_failure(&err);
            }
        }

        self.limiter.stamp();
    }

    /// One full pipeline: list the pastes, then fetch and scan each of them.
    async fn execute_query(&self, domain: &str, root: &str, re: &Regex) -> Result<PipelineReport, QueryError> {
        let mut report = PipelineReport::default();

        let ids = self.extract_ids(domain).await?;
        if ids.is_empty() {
            debug!(source = %self.name, domain = domain, "no pastes mention this domain");
            return Ok(report);
        }

        for id in &ids {
            let url = self.dump_url(id);
            let page = self.fetcher.fetch(&url).await.map_err(|source| {
                self.metrics.increment_fetch_failures();
                QueryError::Fetch { url: url.clone(), source }
            })?;
            self.metrics.increment_documents_fetched();
            report.documents += 1;

            // No root in the text means no match is possible.
            if memchr::memmem::find(page.as_bytes(), root.as_bytes()).is_none() {
                continue;
            }

            for m in re.find_iter(&page) {
                let event = NameDiscovery::new(m.as_str(), domain, self.tag, self.name.as_str());
                if self.bus.publish_name(event) {
                    self.metrics.increment_names_discovered();
                    report.names += 1;
                } else {
                    self.metrics.increment_names_dropped();
                    report.dropped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Ask the search endpoint which pastes mention `domain`.
    async fn extract_ids(&self, domain: &str) -> Result<Vec<String>, QueryError> {
        let url = self.search_url(domain);

        let page = self.fetcher.fetch(&url).await.map_err(|source| {
            self.metrics.increment_fetch_failures();
            QueryError::Fetch { url: url.clone(), source }
        })?;

        let response: DumpSearchResponse = serde_json::from_str(&page).map_err(|source| {
            self.metrics.increment_decode_failures();
            QueryError::Decode { url: url.clone(), source }
        })?;

        debug!(
            source = %self.name,
            search = %response.search,
            count = response.count,
            listed = response.data.len(),
            "paste search answered"
        );

        Ok(response.ids())
    }

    fn report_failure(&self, err: &QueryError) {
        let kind = if err.is_decode() { "decode" } else { "fetch" };
        warn!(source = %self.name, url = err.url(), kind = kind, error = %err, "paste query aborted");
        self.bus.publish_log(LogEvent::new(format!("{}: {}", self.name, err)));
    }

    /// URL listing every paste that mentions `domain`.
    pub fn search_url(&self, domain: &str) -> String {
        format!("{}/api/search/{}", self.base_url, urlencoding::encode(domain))
    }

    /// URL of the raw text of paste `id`.
    pub fn dump_url(&self, id: &str) -> String {
        format!("{}/api/dump/get/{}", self.base_url, urlencoding::encode(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusSubscription, ChannelBus};
    use crate::error::FetchError;
    use crate::models::{AddrRequest, AsnRequest, WhoisRequest};
    use crate::scope::ScopeConfig;
    use crate::sources::request_channels;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tokio::time::Instant;

    const BASE: &str = "https://psbdmp.test";

    #[derive(Default)]
    struct Script {
        responses: HashMap<String, Result<String, String>>,
        calls: Vec<(String, Instant)>,
        in_flight: usize,
        max_in_flight: usize,
    }

    /// Answers from a fixed table and remembers every URL it was asked for.
    #[derive(Clone, Default)]
    struct ScriptedFetcher {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedFetcher {
        fn respond(&self, url: &str, body: &str) -> &Self {
            self.script.lock().responses.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        fn fail(&self, url: &str, reason: &str) -> &Self {
            self.script.lock().responses.insert(url.to_string(), Err(reason.to_string()));
            self
        }

        fn urls(&self) -> Vec<String> {
            self.script.lock().calls.iter().map(|(url, _)| url.clone()).collect()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.script.lock().calls.iter().map(|(_, at)| *at).collect()
        }

        fn max_in_flight(&self) -> usize {
            self.script.lock().max_in_flight
        }
    }

    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            {
                let mut script = self.script.lock();
                script.calls.push((url.to_string(), Instant::now()));
                script.in_flight += 1;
                script.max_in_flight = script.max_in_flight.max(script.in_flight);
            }
            tokio::task::yield_now().await;
            let mut script = self.script.lock();
            script.in_flight -= 1;
            match script.responses.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(reason)) => Err(FetchError::Unavailable(reason.clone())),
                None => Err(FetchError::Status { status: 404, reason: "Not Found".to_string() }),
            }
        }
    }

    struct Harness {
        connector: PastebinConnector<ScriptedFetcher>,
        fetcher: ScriptedFetcher,
        sub: BusSubscription,
        metrics: Arc<MetricsCollector>,
    }

    fn harness() -> Harness {
        harness_with(1024, Arc::new(ScopeConfig::new(["example.com"])))
    }

    fn harness_with(bus_capacity: usize, scope: Arc<dyn ScopeMatcher>) -> Harness {
        let fetcher = ScriptedFetcher::default();
        let (bus, sub) = ChannelBus::bounded(bus_capacity);
        let metrics = Arc::new(MetricsCollector::new());
        let connector = PastebinConnector::new(BASE, fetcher.clone(), scope, Arc::new(bus), metrics.clone());
        Harness { connector, fetcher, sub, metrics }
    }

    /// Claims everything is in scope but has no root or pattern to offer.
    struct PatternlessScope;

    impl ScopeMatcher for PatternlessScope {
        fn is_domain_in_scope(&self, _name: &str) -> bool {
            true
        }

        fn which_domain(&self, _name: &str) -> Option<String> {
            None
        }

        fn domain_regex(&self, _name: &str) -> Option<Regex> {
            None
        }
    }

    fn search(domain: &str) -> String {
        format!("{BASE}/api/search/{domain}")
    }

    fn dump(id: &str) -> String {
        format!("{BASE}/api/dump/get/{id}")
    }

    fn listing(ids: &[&str]) -> String {
        let data: Vec<String> = ids
            .iter()
            .map(|id| format!(r#"{{"id":"{id}","tags":"","time":""}}"#))
            .collect();
        format!(r#"{{"search":"example.com","count":{},"data":[{}]}}"#, ids.len(), data.join(","))
    }

    fn lookup(domain: &str) -> DnsRequest {
        DnsRequest::for_domain(domain, SourceTag::Dns, "test")
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_match_is_published_without_dedup() {
        let mut h = harness();
        h.fetcher
            .respond(&search("example.com"), r#"{"search":"example.com","count":1,"data":[{"id":"abc123","tags":"","time":""}]}"#)
            .respond(&dump("abc123"), "db=www.example.com\nsmtp mail.example.com\nbackup mail.example.com");

        h.connector.handle_dns_request(lookup("example.com")).await;

        let names = h.sub.drain_names();
        let found: Vec<&str> = names.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(found, vec!["www.example.com", "mail.example.com", "mail.example.com"]);
        for name in &names {
            assert_eq!(name.domain, "example.com");
            assert_eq!(name.tag, SourceTag::Api);
            assert_eq!(name.source, "Pastebin");
        }
        assert!(h.sub.drain_logs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_scope_domain_is_silently_dropped() {
        let mut h = harness();
        h.connector.handle_dns_request(lookup("example.net")).await;

        assert!(h.fetcher.urls().is_empty());
        assert!(h.sub.drain_names().is_empty());
        assert!(h.sub.drain_logs().is_empty());
        assert_eq!(h.metrics.snapshot().out_of_scope_requests, 1);
        assert_eq!(h.metrics.snapshot().pipelines_started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_listing_ends_quietly() {
        let mut h = harness();
        h.fetcher.respond(&search("example.com"), r#"{"search":"example.com","count":0,"data":[]}"#);

        h.connector.handle_dns_request(lookup("example.com")).await;

        assert_eq!(h.fetcher.urls(), vec![search("example.com")]);
        assert!(h.sub.drain_names().is_empty());
        assert!(h.sub.drain_logs().is_empty());
        assert_eq!(h.metrics.snapshot().pipelines_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_failure_logs_the_search_url() {
        let mut h = harness();
        h.fetcher.fail(&search("example.com"), "connection refused");

        h.connector.handle_dns_request(lookup("example.com")).await;

        let logs = h.sub.drain_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].message,
            format!("Pastebin: {}: connection refused", search("example.com"))
        );
        assert!(h.sub.drain_names().is_empty());
        assert_eq!(h.fetcher.urls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pastes_are_fetched_in_list_order() {
        let mut h = harness();
        h.fetcher
            .respond(&search("example.com"), &listing(&["c3", "a1", "b2"]))
            .respond(&dump("c3"), "c.example.com")
            .respond(&dump("a1"), "a.example.com")
            .respond(&dump("b2"), "nothing to see here");

        h.connector.handle_dns_request(lookup("example.com")).await;

        assert_eq!(
            h.fetcher.urls(),
            vec![search("example.com"), dump("c3"), dump("a1"), dump("b2")]
        );
        let found: Vec<String> = h.sub.drain_names().into_iter().map(|n| n.name).collect();
        assert_eq!(found, vec!["c.example.com", "a.example.com"]);
        assert_eq!(h.metrics.snapshot().documents_fetched, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failed_paste_aborts_the_rest() {
        let mut h = harness();
        h.fetcher
            .respond(&search("example.com"), &listing(&["p1", "p2", "p3", "p4"]))
            .respond(&dump("p1"), "one.example.com")
            .fail(&dump("p2"), "reset by peer")
            .respond(&dump("p3"), "three.example.com")
            .respond(&dump("p4"), "four.example.com");

        h.connector.handle_dns_request(lookup("example.com")).await;

        assert_eq!(h.fetcher.urls(), vec![search("example.com"), dump("p1"), dump("p2")]);
        let found: Vec<String> = h.sub.drain_names().into_iter().map(|n| n.name).collect();
        assert_eq!(found, vec!["one.example.com"]);

        let logs = h.sub.drain_logs();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].message.contains(&dump("p2")));

        let snap = h.metrics.snapshot();
        assert_eq!(snap.documents_fetched, 1);
        assert_eq!(snap.pipelines_aborted, 1);
        assert_eq!(snap.fetch_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_paste_failure_yields_nothing_but_a_log() {
        let mut h = harness();
        h.fetcher
            .respond(&search("example.com"), &listing(&["p1"]))
            .fail(&dump("p1"), "timed out");

        h.connector.handle_dns_request(lookup("example.com")).await;

        assert_eq!(h.fetcher.urls(), vec![search("example.com"), dump("p1")]);
        assert!(h.sub.drain_names().is_empty());
        let logs = h.sub.drain_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, format!("Pastebin: {}: timed out", dump("p1")));

        let snap = h.metrics.snapshot();
        assert_eq!(snap.documents_fetched, 0);
        assert_eq!(snap.names_discovered, 0);
        assert_eq!(snap.pipelines_aborted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_bus_counts_only_delivered_names() {
        let mut h = harness_with(2, Arc::new(ScopeConfig::new(["example.com"])));
        h.fetcher
            .respond(&search("example.com"), &listing(&["big"]))
            .respond(&dump("big"), "a.example.com b.example.com c.example.com d.example.com");

        h.connector.handle_dns_request(lookup("example.com")).await;

        let found: Vec<String> = h.sub.drain_names().into_iter().map(|n| n.name).collect();
        assert_eq!(found, vec!["a.example.com", "b.example.com"]);
        assert!(h.sub.drain_logs().is_empty());

        let snap = h.metrics.snapshot();
        assert_eq!(snap.names_discovered, 2);
        assert_eq!(snap.names_dropped, 2);
        assert_eq!(snap.pipelines_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_scope_domain_without_pattern_is_aborted() {
        let mut h = harness_with(16, Arc::new(PatternlessScope));

        h.connector.handle_dns_request(lookup("example.com")).await;

        assert!(h.fetcher.urls().is_empty());
        assert!(h.sub.drain_names().is_empty());
        assert!(h.sub.drain_logs().is_empty());
        let snap = h.metrics.snapshot();
        assert_eq!(snap.pipelines_started, 1);
        assert_eq!(snap.pipelines_aborted, 1);
        assert_eq!(snap.pipelines_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_domain_is_normalised() {
        let mut h = harness();
        h.fetcher
            .respond(&search("www.example.com"), &listing(&["n1"]))
            .respond(&dump("n1"), "api.example.com");

        h.connector.handle_dns_request(lookup("WWW.Example.COM.")).await;

        assert_eq!(h.fetcher.urls(), vec![search("www.example.com"), dump("n1")]);
        let names = h.sub.drain_names();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].name, "api.example.com");
        assert_eq!(names[0].domain, "www.example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_listing_only_aborts_its_own_pipeline() {
        let mut h = harness();
        h.fetcher.respond(&search("example.com"), "<html>502 Bad Gateway</html>");

        h.connector.handle_dns_request(lookup("example.com")).await;

        let logs = h.sub.drain_logs();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].message.starts_with(&format!("Pastebin: {}: malformed response", search("example.com"))));
        assert_eq!(h.metrics.snapshot().decode_failures, 1);

        // The connector is still alive and well for the next lookup.
        h.fetcher
            .respond(&search("example.com"), &listing(&["ok"]))
            .respond(&dump("ok"), "vpn.example.com");
        h.connector.handle_dns_request(lookup("example.com")).await;
        assert_eq!(h.sub.drain_names().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subdomain_lookup_keeps_the_requested_domain() {
        let mut h = harness();
        h.fetcher
            .respond(&search("dev.example.com"), &listing(&["d1"]))
            .respond(&dump("d1"), "ci.dev.example.com and www.example.com");

        h.connector.handle_dns_request(lookup("dev.example.com")).await;

        let names = h.sub.drain_names();
        let found: Vec<&str> = names.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(found, vec!["ci.dev.example.com", "www.example.com"]);
        assert!(names.iter().all(|n| n.domain == "dev.example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_is_refetched_for_every_lookup() {
        let mut h = harness();
        h.fetcher.respond(&search("example.com"), &listing(&[]));

        h.connector.handle_dns_request(lookup("example.com")).await;
        h.connector.handle_dns_request(lookup("example.com")).await;

        assert_eq!(h.fetcher.urls(), vec![search("example.com"), search("example.com")]);
    }

    #[test]
    fn test_url_helpers() {
        let h = harness();
        assert_eq!(h.connector.search_url("example.com"), "https://psbdmp.test/api/search/example.com");
        assert_eq!(h.connector.dump_url("abc123"), "https://psbdmp.test/api/dump/get/abc123");
        assert_eq!(h.connector.dump_url("a/b c"), "https://psbdmp.test/api/dump/get/a%2Fb%20c");
        assert_eq!(h.connector.name(), "Pastebin");
        assert_eq!(h.connector.tag(), SourceTag::Api);
    }

    async fn wait_for_calls(fetcher: &ScriptedFetcher, n: usize) {
        for _ in 0..10_000 {
            if fetcher.urls().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("fetcher saw {} calls, expected {}", fetcher.urls().len(), n);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_lookups_are_rate_limited_and_serial() {
        let h = harness();
        h.fetcher
            .respond(&search("example.com"), &listing(&["x"]))
            .respond(&dump("x"), "x.example.com")
            .respond(&search("www.example.com"), &listing(&[]));

        let (channels, inbox) = request_channels(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let fetcher = h.fetcher.clone();
        let worker = tokio::spawn(h.connector.run(inbox, shutdown_rx));

        channels.dns.send(lookup("example.com")).await.unwrap();
        channels.dns.send(lookup("www.example.com")).await.unwrap();
        wait_for_calls(&fetcher, 3).await;

        let times = fetcher.call_times();
        assert_eq!(fetcher.urls()[2], search("www.example.com"));
        assert!(times[2] - times[0] >= RATE_LIMIT);
        assert_eq!(fetcher.max_in_flight(), 1);

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
        assert_eq!(h.sub.drain_names().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_requests_are_drained() {
        let h = harness();
        let (channels, inbox) = request_channels(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let fetcher = h.fetcher.clone();
        let metrics = h.metrics.clone();
        let worker = tokio::spawn(h.connector.run(inbox, shutdown_rx));

        // Capacity is one, so these sends only complete if the worker reads.
        for i in 0..3 {
            channels
                .addr
                .send(AddrRequest {
                    address: format!("10.0.0.{i}"),
                    domain: "example.com".to_string(),
                    tag: SourceTag::Dns,
                    source: "test".to_string(),
                })
                .await
                .unwrap();
        }
        channels
            .asn
            .send(AsnRequest {
                address: "10.0.0.1".to_string(),
                asn: 64512,
                prefix: "10.0.0.0/8".to_string(),
                description: "private".to_string(),
                tag: SourceTag::Api,
                source: "test".to_string(),
            })
            .await
            .unwrap();
        channels
            .whois
            .send(WhoisRequest {
                domain: "example.com".to_string(),
                new_domains: vec![],
                tag: SourceTag::Api,
                source: "test".to_string(),
            })
            .await
            .unwrap();

        for _ in 0..1_000 {
            if metrics.snapshot().ignored_requests == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(metrics.snapshot().ignored_requests, 5);
        assert!(fetcher.urls().is_empty());
        assert!(h.sub.drain_names().is_empty());
        assert!(h.sub.drain_logs().is_empty());

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_request_is_not_starved_by_a_lookup_backlog() {
        let h = harness();
        h.fetcher.respond(&search("example.com"), &listing(&[]));
        let (channels, inbox) = request_channels(32);
        for _ in 0..20 {
            channels.dns.send(lookup("example.com")).await.unwrap();
        }
        channels
            .addr
            .send(AddrRequest {
                address: "10.0.0.1".to_string(),
                domain: "example.com".to_string(),
                tag: SourceTag::Dns,
                source: "test".to_string(),
            })
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = h.metrics.clone();
        let worker = tokio::spawn(h.connector.run(inbox, shutdown_rx));

        for _ in 0..10_000 {
            if metrics.snapshot().ignored_requests == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.ignored_requests, 1);
        // Read no later than right after the first pipeline.
        assert!(snap.pipelines_started <= 1);

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_the_loop() {
        let h = harness();
        let (_channels, inbox) = request_channels(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(h.connector.run(inbox, shutdown_rx));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("connector did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_stops_the_loop() {
        let h = harness();
        let (_channels, inbox) = request_channels(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(h.connector.run(inbox, shutdown_rx));

        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("connector did not stop")
            .unwrap();
    }
}
