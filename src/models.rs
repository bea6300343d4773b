// =============================================================================
// models.rs — WHAT FLOWS IN, WHAT FLOWS OUT
// =============================================================================
//
// Inbound: four kinds of lookup request, handed to every connector by the
// orchestration layer. Only domain lookups mean anything to a paste archive.
//
// Outbound: discovered names and log lines, one event at a time.
//
// In between: the psbdmp search response, which lives for exactly as long as
// it takes to pull the paste identifiers out of it.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// How a source came by its data. Every event carries one of these so the
/// downstream graph knows what kind of evidence backs a name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// A third-party API answered the question.
    Api,
    /// A web archive had it.
    Archive,
    /// Certificate transparency.
    Cert,
    /// Plain DNS resolution.
    Dns,
    /// Scraped out of a web page.
    Scrape,
    /// Brute forced.
    Brute,
    /// Somebody outside the system told us.
    External,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTag::Api => write!(f, "api"),
            SourceTag::Archive => write!(f, "archive"),
            SourceTag::Cert => write!(f, "cert"),
            SourceTag::Dns => write!(f, "dns"),
            SourceTag::Scrape => write!(f, "scrape"),
            SourceTag::Brute => write!(f, "brute"),
            SourceTag::External => write!(f, "external"),
        }
    }
}

// =============================================================================
// Inbound requests
// =============================================================================

/// Ask a connector what it knows about a domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRequest {
    pub name: String,
    pub domain: String,
    pub tag: SourceTag,
    pub source: String,
}

impl DnsRequest {
    /// A lookup for a root domain, as issued when an enumeration starts.
    pub fn for_domain(domain: impl Into<String>, tag: SourceTag, source: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            name: domain.clone(),
            domain,
            tag,
            source: source.into(),
        }
    }
}

/// Ask a connector about an IP address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddrRequest {
    pub address: String,
    pub domain: String,
    pub tag: SourceTag,
    pub source: String,
}

/// Ask a connector about an autonomous system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AsnRequest {
    pub address: String,
    pub asn: u32,
    pub prefix: String,
    pub description: String,
    pub tag: SourceTag,
    pub source: String,
}

/// Ask a connector for WHOIS-related domains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhoisRequest {
    pub domain: String,
    pub new_domains: Vec<String>,
    pub tag: SourceTag,
    pub source: String,
}

// =============================================================================
// psbdmp search response
// =============================================================================

/// Body of `GET /api/search/{domain}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DumpSearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub search: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<DumpItem>,
}

/// One paste listed by the search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DumpItem {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time: String,
}

impl DumpSearchResponse {
    /// Paste identifiers, in the order the API listed them.
    pub fn ids(&self) -> Vec<String> {
        self.data.iter().map(|item| item.id.clone()).collect()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Outbound events
// =============================================================================

/// A hostname found in a paste. One of these per match, duplicates included;
/// deduplication is somebody else's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameDiscovery {
    /// The hostname exactly as it appeared in the paste.
    pub name: String,
    /// The domain the lookup was issued for.
    pub domain: String,
    pub tag: SourceTag,
    /// Name of the connector that found it.
    pub source: String,
    pub discovered_at: DateTime<Utc>,
}

impl NameDiscovery {
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        tag: SourceTag,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            tag,
            source: source.into(),
            discovered_at: Utc::now(),
        }
    }
}

impl fmt::Display for NameDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) via {} [{}]", self.name, self.domain, self.source, self.tag)
    }
}

/// A free-text diagnostic line for the log topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    pub logged_at: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            logged_at: Utc::now(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_keeps_list_order() {
        let body = r#"{"search":"example.com","count":3,"data":[
            {"id":"c3","tags":"","time":"2020-01-03"},
            {"id":"a1","tags":"leak","time":"2020-01-01"},
            {"id":"b2","tags":"","time":""}
        ]}"#;
        let response: DumpSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.search, "example.com");
        assert_eq!(response.count, 3);
        assert_eq!(response.ids(), vec!["c3", "a1", "b2"]);
    }

    #[test]
    fn test_search_response_tolerates_nulls_and_missing_fields() {
        let body = r#"{"search":"example.com","count":1,"data":[{"id":"x","tags":null}]}"#;
        let response: DumpSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.data[0].tags, "");
        assert_eq!(response.data[0].time, "");

        let empty: DumpSearchResponse = serde_json::from_str(r#"{"search":"example.com","count":0,"data":null}"#).unwrap();
        assert!(empty.ids().is_empty());
    }

    #[test]
    fn test_search_response_rejects_garbage() {
        assert!(serde_json::from_str::<DumpSearchResponse>("<html>rate limited</html>").is_err());
    }

    #[test]
    fn test_source_tag_wire_format() {
        assert_eq!(SourceTag::Api.to_string(), "api");
        assert_eq!(serde_json::to_string(&SourceTag::Scrape).unwrap(), "\"scrape\"");
    }

    #[test]
    fn test_dns_request_for_domain() {
        let req = DnsRequest::for_domain("example.com", SourceTag::External, "seed");
        assert_eq!(req.name, "example.com");
        assert_eq!(req.domain, "example.com");
    }
}
