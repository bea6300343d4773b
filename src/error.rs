// =============================================================================
// error.rs — HOW THINGS GO WRONG
// =============================================================================
//
// Two layers. A FetchError is whatever the page fetcher tripped over. A
// QueryError is a failed pipeline step, always pinned to the URL that caused
// it, because a log line without the URL is a log line nobody can act on.
//
// An out-of-scope domain is not in here. That's not an error, that's a no.
// =============================================================================

use thiserror::Error;

/// Failure to retrieve a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never got a response (DNS, connect, TLS, timeout).
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The server answered, just not with a 2xx.
    #[error("HTTP {status} {reason}")]
    Status { status: u16, reason: String },

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// Anything else a fetcher wants to report.
    #[error("{0}")]
    Unavailable(String),
}

/// Failure of one step of a query pipeline. Either kind aborts the pipeline
/// it happened in and nothing else.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("{url}: malformed response: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl QueryError {
    /// The URL the failing step was working on.
    pub fn url(&self) -> &str {
        match self {
            QueryError::Fetch { url, .. } | QueryError::Decode { url, .. } => url,
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, QueryError::Decode { .. })
    }
}
