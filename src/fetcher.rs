// =============================================================================
// fetcher.rs — THE PAGE FETCHER
// =============================================================================
//
// A GET, a body, or an error. That's the whole contract. The connector hands
// in a URL and blocks until the fetcher is done with it; any timeout lives on
// the HTTP client, not in the connector.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::FetchError;

/// Retrieves the body of a web page.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// The reqwest-backed fetcher used in production.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Request)?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(FetchError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let body = response.text().await.map_err(FetchError::Body)?;
        debug!(url = url, bytes = body.len(), "page fetched");
        Ok(body)
    }
}
